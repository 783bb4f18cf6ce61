//! SQL text emission.
//!
//! [`Writer`] accumulates statement text as a list of tokens rather than a
//! flat string. Text is only joined when the statement is finished, which
//! gives three capabilities without re-scanning or splicing strings:
//!
//! - **Reserved slots**: [`Writer::reserve`] records a position whose text is
//!   supplied later with [`Writer::fill`], for decorations that are only known
//!   after the rest of the statement was emitted.
//! - **Deferred section**: writes issued inside [`Writer::sorting`] go to a
//!   second buffer holding the ORDER BY list. It is appended once at the end,
//!   or handed to the dialect pagination rewrite.
//! - **Scoped capture**: [`Writer::capture`] returns the text emitted by a
//!   callback and removes it from the buffer, so fragments such as
//!   subqueries can be rendered in place and reused.
//!
//! Negated emission is expressed with an explicit [`Polarity`] argument; the
//! writer holds no negation state.
//!
//! Parameters live in a bag shared by a writer and every writer created from
//! it with [`Writer::nested`], so parameter names stay unique across all
//! fragments of one translation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use sqlchain_core::{Result, Value, split_identifier};

use crate::command::Parameters;
use crate::dialect::SqlSettings;
use crate::expr::BinaryOp;

/// Whether a predicate is emitted as written or in its negated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Emit as written.
    #[default]
    Positive,
    /// Emit the logical negation.
    Negated,
}

impl Polarity {
    /// The opposite polarity.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Polarity::Positive => Polarity::Negated,
            Polarity::Negated => Polarity::Positive,
        }
    }

    /// Check if this is the negated polarity.
    pub const fn is_negated(self) -> bool {
        matches!(self, Polarity::Negated)
    }
}

/// A reserved position in a writer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

#[derive(Debug, Clone)]
enum Token {
    Text(String),
    Slot(usize),
}

#[derive(Debug)]
struct BoundParameter {
    name: String,
    base: String,
    value: Value,
}

/// Parameters bound during one translation.
#[derive(Debug, Default)]
struct ParameterBag {
    entries: Vec<BoundParameter>,
    counter: usize,
}

impl ParameterBag {
    /// Bind `value` under `base`, returning the canonical parameter name.
    fn bind(&mut self, base: &str, value: Value) -> String {
        if let Some(existing) = self
            .entries
            .iter()
            .find(|b| b.base == base && b.value == value)
        {
            return existing.name.clone();
        }

        let mut name = base.to_string();
        while self.entries.iter().any(|b| b.name == name) {
            self.counter += 1;
            name = format!("{base}_{}", self.counter);
        }

        self.entries.push(BoundParameter {
            name: name.clone(),
            base: base.to_string(),
            value,
        });
        name
    }

    fn snapshot(&self) -> Parameters {
        let mut params = Parameters::new();
        for entry in &self.entries {
            params.push(entry.name.clone(), entry.value.clone());
        }
        params
    }

    /// Entries whose placeholder appears in `sql`. Fragments dropped
    /// during translation, such as sort keys lost to wrapping, leave their
    /// values bound but unreferenced.
    fn referenced(&self, sql: &str, settings: &dyn SqlSettings) -> Parameters {
        let mut params = Parameters::new();
        for entry in &self.entries {
            let placeholder = settings.parameter_name(&entry.name);
            if references(sql, &placeholder) {
                params.push(entry.name.clone(), entry.value.clone());
            }
        }
        params
    }
}

/// Does `sql` contain `placeholder` as a whole name, so `@p` does not match
/// inside `@p_1`?
fn references(sql: &str, placeholder: &str) -> bool {
    sql.match_indices(placeholder).any(|(at, _)| {
        sql[at + placeholder.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// Token buffer for one statement or fragment.
pub struct Writer {
    settings: Arc<dyn SqlSettings>,
    bag: Rc<RefCell<ParameterBag>>,
    primary: Vec<Token>,
    deferred: Vec<Token>,
    slots: Vec<Option<String>>,
    sorting: bool,
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("engine", &self.settings.engine())
            .field("primary", &self.primary_text())
            .field("deferred", &self.order_by_text())
            .field("parameters", &self.bag.borrow().entries.len())
            .finish()
    }
}

impl Writer {
    /// Create a writer with an empty parameter bag.
    pub fn new(settings: Arc<dyn SqlSettings>) -> Self {
        Self {
            settings,
            bag: Rc::new(RefCell::new(ParameterBag::default())),
            primary: Vec::new(),
            deferred: Vec::new(),
            slots: Vec::new(),
            sorting: false,
        }
    }

    /// Create a writer with its own buffers that shares this writer's
    /// settings and parameter bag.
    pub fn nested(&self) -> Writer {
        Writer {
            settings: Arc::clone(&self.settings),
            bag: Rc::clone(&self.bag),
            primary: Vec::new(),
            deferred: Vec::new(),
            slots: Vec::new(),
            sorting: false,
        }
    }

    /// Dialect settings.
    pub fn settings(&self) -> &Arc<dyn SqlSettings> {
        &self.settings
    }

    fn buffer(&mut self) -> &mut Vec<Token> {
        if self.sorting {
            &mut self.deferred
        } else {
            &mut self.primary
        }
    }

    // ==================== Text ====================

    /// Append raw text.
    pub fn write(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.buffer().push(Token::Text(text));
        }
    }

    /// Append a clause keyword.
    pub fn keyword(&mut self, keyword: &str) {
        self.write(keyword);
    }

    /// Append a single space.
    pub fn whitespace(&mut self) {
        self.write(" ");
    }

    /// Append a list delimiter.
    pub fn delimiter(&mut self) {
        self.write(", ");
    }

    /// Append an opening parenthesis.
    pub fn open_brace(&mut self) {
        self.write("(");
    }

    /// Append a closing parenthesis.
    pub fn close_brace(&mut self) {
        self.write(")");
    }

    // ==================== Identifiers ====================

    /// Quote an identifier, splitting dotted and already-quoted names into
    /// components that are each re-quoted for the dialect.
    pub fn quoted(&self, ident: &str) -> String {
        split_identifier(ident)
            .iter()
            .map(|part| self.settings.name(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Append a quoted identifier.
    pub fn name(&mut self, ident: &str) {
        let quoted = self.quoted(ident);
        self.write(quoted);
    }

    /// Append `prefix.` with the prefix quoted.
    pub fn limit(&mut self, prefix: &str) {
        self.name(prefix);
        self.write(".");
    }

    /// Append ` AS name`.
    pub fn alias(&mut self, name: &str) {
        self.write(" AS ");
        self.name(name);
    }

    // ==================== Values ====================

    /// Append the dialect NULL literal.
    pub fn null(&mut self) {
        let null = self.settings.null_literal();
        self.write(null);
    }

    /// Append a reference to a bound parameter.
    ///
    /// NULL is written inline and never bound. A value equal to one already
    /// bound under the same base name reuses that parameter.
    pub fn parameter(&mut self, base: &str, value: Value) {
        if value.is_null() {
            self.null();
            return;
        }
        let base = if base.is_empty() { "p" } else { base };
        let name = self.bag.borrow_mut().bind(base, value);
        let placeholder = self.settings.parameter_name(&name);
        self.write(placeholder);
    }

    /// Append a constant: booleans and finite numbers inline, NULL as the
    /// NULL literal, anything else as parameter `p`.
    pub fn constant(&mut self, value: Value) {
        match &value {
            Value::Null => self.null(),
            Value::Bool(b) => {
                let literal = self.settings.bool_literal(*b);
                self.write(literal);
            }
            _ => match value.numeric_literal() {
                Some(literal) => self.write(literal),
                None => self.parameter("p", value),
            },
        }
    }

    /// Snapshot of the bound parameters.
    pub fn parameters(&self) -> Parameters {
        self.bag.borrow().snapshot()
    }

    /// Snapshot of the bound parameters that the finished statement `sql`
    /// refers to.
    pub fn parameters_in(&self, sql: &str) -> Parameters {
        self.bag.borrow().referenced(sql, self.settings.as_ref())
    }

    // ==================== Polarity ====================

    /// Append a binary operator, negated comparisons flipped
    /// (`>` ↔ `<=`, `=` ↔ `<>`).
    pub fn compare(&mut self, op: BinaryOp, polarity: Polarity) {
        let op = if polarity.is_negated() {
            op.negate().unwrap_or(op)
        } else {
            op
        };
        self.write(format!(" {} ", op.as_str()));
    }

    /// Append `AND`/`OR`, swapped under negation.
    pub fn logical(&mut self, op: BinaryOp, polarity: Polarity) {
        let op = match (op, polarity) {
            (BinaryOp::And, Polarity::Negated) => BinaryOp::Or,
            (BinaryOp::Or, Polarity::Negated) => BinaryOp::And,
            (op, _) => op,
        };
        self.write(format!(" {} ", op.as_str()));
    }

    /// Append ` LIKE ` or ` NOT LIKE `.
    pub fn like(&mut self, polarity: Polarity) {
        self.write(if polarity.is_negated() {
            " NOT LIKE "
        } else {
            " LIKE "
        });
    }

    /// Append ` IN ` or ` NOT IN `.
    pub fn in_list(&mut self, polarity: Polarity) {
        self.write(if polarity.is_negated() {
            " NOT IN "
        } else {
            " IN "
        });
    }

    /// Append `EXISTS` or `NOT EXISTS`.
    pub fn exists(&mut self, polarity: Polarity) {
        self.write(if polarity.is_negated() {
            "NOT EXISTS"
        } else {
            "EXISTS"
        });
    }

    /// Append ` IS NULL` or ` IS NOT NULL`.
    pub fn is_null(&mut self, polarity: Polarity) {
        self.write(if polarity.is_negated() {
            " IS NOT NULL"
        } else {
            " IS NULL"
        });
    }

    /// Append an always-true or always-false predicate.
    pub fn truth(&mut self, value: bool, polarity: Polarity) {
        self.write(if value != polarity.is_negated() {
            "1=1"
        } else {
            "1=0"
        });
    }

    // ==================== Slots ====================

    /// Reserve a position in the active buffer.
    pub fn reserve(&mut self) -> Slot {
        let id = self.slots.len();
        self.slots.push(None);
        self.buffer().push(Token::Slot(id));
        Slot(id)
    }

    /// Supply the text of a reserved position. Unfilled slots render empty.
    pub fn fill(&mut self, slot: Slot, text: impl Into<String>) {
        if let Some(entry) = self.slots.get_mut(slot.0) {
            *entry = Some(text.into());
        }
    }

    // ==================== Scopes ====================

    /// Run `f` and return exactly the text it wrote to the active buffer,
    /// removing that text from the buffer.
    ///
    /// Captures nest. Slots reserved inside `f` must be filled before it
    /// returns.
    pub fn capture<F>(&mut self, f: F) -> Result<String>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let sorting = self.sorting;
        let start = self.buffer().len();

        let outcome = f(self);

        let buffer = if sorting {
            &mut self.deferred
        } else {
            &mut self.primary
        };
        let tokens: Vec<Token> = buffer.drain(start.min(buffer.len())..).collect();
        outcome?;
        Ok(self.render(&tokens))
    }

    /// Run `f` with writes redirected to the deferred ORDER BY buffer.
    pub fn sorting<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let previous = self.sorting;
        self.sorting = true;
        let outcome = f(self);
        self.sorting = previous;
        outcome
    }

    // ==================== Output ====================

    fn render(&self, tokens: &[Token]) -> String {
        let mut out = String::new();
        for token in tokens {
            match token {
                Token::Text(text) => out.push_str(text),
                Token::Slot(id) => {
                    if let Some(Some(text)) = self.slots.get(*id) {
                        out.push_str(text);
                    }
                }
            }
        }
        out
    }

    /// Text of the primary buffer.
    pub fn primary_text(&self) -> String {
        self.render(&self.primary)
    }

    /// Text of the deferred ORDER BY buffer, without the keyword.
    pub fn order_by_text(&self) -> String {
        self.render(&self.deferred)
    }

    /// Finished statement: primary text, then ` ORDER BY ` and the deferred
    /// text when any was written.
    pub fn sql(&self) -> String {
        let mut sql = self.primary_text();
        let order_by = self.order_by_text();
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by);
        }
        sql
    }

    /// Finished paged statement from the dialect pagination rewrite.
    pub fn paginate(&self, take: Option<u64>, skip: u64) -> String {
        let order_by = self.order_by_text();
        tracing::trace!(?take, skip, order_by = %order_by, "Paginating statement");
        self.settings
            .to_sql(&self.primary_text(), take, skip, &order_by)
    }
}
