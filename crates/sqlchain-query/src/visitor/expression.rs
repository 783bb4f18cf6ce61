//! Lambda body translation.
//!
//! [`ExpressionWriter`] turns lambda bodies into SQL fragments. Lambda
//! parameters resolve through a scope stack to the [`Shape`] of the row they
//! stand for, so member access becomes a qualified column and a reference to
//! an outer parameter inside a subquery becomes a correlation.
//!
//! Conditions are written with an explicit [`Polarity`]: `!` flips it and
//! every primitive below renders its own negated form, so `!(x > 0)` comes
//! out as `x <= 0` rather than `NOT (x > 0)`.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use sqlchain_core::{Error, Result, Value};

use super::CustomVisitor;
use super::select::{RenderMode, Shape};
use super::walker::Terminal;
use crate::config::TranslateConfig;
use crate::dialect::SqlSettings;
use crate::dispatch::{AggregateFunction, Method};
use crate::expr::{BinaryOp, Call, Expr, UnaryOp};
use crate::writer::{Polarity, Writer};

/// Translates expressions for one tree walk.
///
/// Custom visitors receive the active `ExpressionWriter` so they can
/// translate the arguments of the call they handle.
pub struct ExpressionWriter<'a> {
    config: &'a TranslateConfig,
    scopes: RefCell<Vec<(String, Shape)>>,
    claimed: RefCell<Vec<String>>,
    aliases: Cell<usize>,
}

impl std::fmt::Debug for ExpressionWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionWriter")
            .field("scopes", &self.scopes.borrow().len())
            .field("aliases", &self.claimed.borrow())
            .finish()
    }
}

impl<'a> ExpressionWriter<'a> {
    pub fn new(config: &'a TranslateConfig) -> Self {
        Self {
            config,
            scopes: RefCell::new(Vec::new()),
            claimed: RefCell::new(Vec::new()),
            aliases: Cell::new(0),
        }
    }

    /// Dialect settings.
    pub fn settings(&self) -> &Arc<dyn SqlSettings> {
        self.config.settings()
    }

    // ==================== Scopes ====================

    /// Run `f` with lambda parameters bound; the bindings are removed again
    /// on every exit path.
    pub(crate) fn with_scope<R>(
        &self,
        bindings: Vec<(String, Shape)>,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let depth = self.scopes.borrow().len();
        self.scopes.borrow_mut().extend(bindings);
        let outcome = f();
        self.scopes.borrow_mut().truncate(depth);
        outcome
    }

    /// Allocate a table alias unique within this walk, preferring a lambda
    /// parameter name.
    pub(crate) fn allocate_alias(&self, preferred: Option<&str>) -> String {
        let mut claimed = self.claimed.borrow_mut();
        let name = match preferred {
            Some(name) if !claimed.iter().any(|c| c == name) => name.to_string(),
            _ => loop {
                let n = self.aliases.get();
                self.aliases.set(n + 1);
                let candidate = format!("t{n}");
                if !claimed.contains(&candidate) {
                    break candidate;
                }
            },
        };
        claimed.push(name.clone());
        name
    }

    /// Shape of a parameter or member path.
    pub(crate) fn resolve(&self, w: &Writer, expr: &Expr) -> Result<Shape> {
        match expr {
            Expr::Parameter(name) => self
                .scopes
                .borrow()
                .iter()
                .rev()
                .find(|(bound, _)| bound == name)
                .map(|(_, shape)| shape.clone())
                .ok_or_else(|| {
                    Error::unsupported(format!("parameter '{name}' is not bound to a query"))
                }),
            Expr::Member { target, name } => self.resolve(w, target)?.member(name, w),
            other => Err(Error::unsupported(format!(
                "members of a {} cannot be accessed",
                other.kind()
            ))),
        }
    }

    /// Shape of a projection body.
    pub(crate) fn project(&self, w: &mut Writer, expr: &Expr) -> Result<Shape> {
        match expr {
            Expr::New(fields) => fields
                .iter()
                .map(|(name, field)| Ok((name.clone(), self.project(w, field)?)))
                .collect::<Result<Vec<_>>>()
                .map(Shape::Members),
            Expr::Parameter(_) | Expr::Member { .. } => self.resolve(w, expr),
            other => Ok(Shape::Scalar(w.capture(|w| self.write(w, other))?)),
        }
    }

    fn custom(&self, call: &Call) -> Option<&Arc<dyn CustomVisitor>> {
        self.config.visitors().iter().find(|v| v.can_resolve(call))
    }

    // ==================== Values ====================

    /// Write `expr` as a value.
    pub fn write(&self, w: &mut Writer, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Constant(value) => w.constant(value.clone()),
            Expr::Variable { name, value } => w.parameter(name, value.clone()),
            Expr::Parameter(_) | Expr::Member { .. } => match self.resolve(w, expr)? {
                Shape::Scalar(sql) => w.write(sql),
                other => {
                    return Err(Error::unsupported(format!(
                        "a whole {} cannot be used as a value",
                        other.kind()
                    )));
                }
            },
            Expr::Binary {
                left,
                op: BinaryOp::Coalesce,
                right,
            } => {
                w.keyword("COALESCE(");
                self.write(w, left)?;
                w.delimiter();
                self.write(w, right)?;
                w.close_brace();
            }
            Expr::Binary {
                left,
                op: BinaryOp::Concat,
                right,
            } => {
                let parts = vec![
                    w.capture(|w| self.write(w, left))?,
                    w.capture(|w| self.write(w, right))?,
                ];
                let sql = w.settings().concat(&parts);
                w.write(sql);
            }
            Expr::Binary { op, .. } if op.is_comparison() || op.is_logical() => {
                return self.case_when(w, |w| self.write_condition(w, expr, Polarity::Positive));
            }
            Expr::Binary { left, op, right } => {
                w.open_brace();
                self.write(w, left)?;
                w.write(format!(" {} ", op.as_str()));
                self.write(w, right)?;
                w.close_brace();
            }
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => {
                return self.case_when(w, |w| self.write_condition(w, expr, Polarity::Positive));
            }
            Expr::Unary {
                op: UnaryOp::Neg,
                expr: inner,
            } => {
                w.write("(-");
                self.write(w, inner)?;
                w.close_brace();
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                w.keyword("CASE WHEN ");
                self.write_condition(w, test, Polarity::Positive)?;
                w.keyword(" THEN ");
                self.write(w, then)?;
                w.keyword(" ELSE ");
                self.write(w, otherwise)?;
                w.keyword(" END");
            }
            Expr::Call(call) if call.op.is_some() => {
                return self.write_subquery(w, call, Polarity::Positive, false);
            }
            Expr::Call(call) => return self.write_method(w, call),
            other => {
                return Err(Error::unsupported(format!(
                    "a {} cannot be used as a value",
                    other.kind()
                )));
            }
        }
        Ok(())
    }

    /// `CASE WHEN cond THEN true ELSE false END`
    fn case_when<F>(&self, w: &mut Writer, condition: F) -> Result<()>
    where
        F: FnOnce(&mut Writer) -> Result<()>,
    {
        w.keyword("CASE WHEN ");
        condition(w)?;
        w.keyword(" THEN ");
        let yes = w.settings().bool_literal(true);
        w.write(yes);
        w.keyword(" ELSE ");
        let no = w.settings().bool_literal(false);
        w.write(no);
        w.keyword(" END");
        Ok(())
    }

    fn write_method(&self, w: &mut Writer, call: &Call) -> Result<()> {
        let Some(method) = Method::from_name(&call.name) else {
            return self.write_custom(w, call);
        };
        let receiver = arg(call, 0)?;

        match method {
            Method::Length => {
                let operand = w.capture(|w| self.write(w, receiver))?;
                let sql = w.settings().length(&operand);
                w.write(sql);
            }
            Method::IndexOf => {
                let needle = arg(call, 1)?;
                let haystack = w.capture(|w| self.write(w, receiver))?;
                let needle = w.capture(|w| self.write(w, needle))?;
                let sql = w.settings().index_of(&haystack, &needle);
                w.write(sql);
            }
            Method::Substring => {
                let operand = w.capture(|w| self.write(w, receiver))?;
                let start_expr = arg(call, 1)?;
                let constant = match start_expr {
                    Expr::Constant(value) => value.as_i64(),
                    _ => None,
                };
                let start = match constant {
                    Some(n) => n
                        .checked_add(1)
                        .ok_or_else(|| {
                            Error::Argument(format!("substring start {n} is out of range"))
                        })?
                        .to_string(),
                    None => format!("({} + 1)", w.capture(|w| self.write(w, start_expr))?),
                };
                let len = match call.args.get(2) {
                    Some(len) => Some(w.capture(|w| self.write(w, len))?),
                    None => None,
                };
                let sql = w.settings().substring(&operand, &start, len.as_deref());
                w.write(sql);
            }
            Method::ToUpper | Method::ToLower | Method::Trim => {
                let function = match method {
                    Method::ToUpper => "UPPER",
                    Method::ToLower => "LOWER",
                    _ => "TRIM",
                };
                w.write(format!("{function}("));
                self.write(w, receiver)?;
                w.close_brace();
            }
            Method::Contains | Method::StartsWith | Method::EndsWith | Method::IsNullOrEmpty => {
                return self.case_when(w, |w| {
                    self.write_method_condition(w, call, Polarity::Positive)
                });
            }
            Method::Aggregate(function) => return self.write_group_aggregate(w, call, function),
        }
        Ok(())
    }

    /// `g.Count()`, `g.Sum(x => ..)` and friends over a group parameter.
    fn write_group_aggregate(
        &self,
        w: &mut Writer,
        call: &Call,
        function: AggregateFunction,
    ) -> Result<()> {
        let element = match self.resolve(w, arg(call, 0)?)? {
            Shape::Group { element, .. } => *element,
            other => {
                return Err(Error::unsupported_operator(
                    &call.name,
                    format!("aggregates apply to a group, not a {}", other.kind()),
                ));
            }
        };

        match (function.is_count(), call.lambda(1)) {
            (true, None) => w.write("COUNT(*)"),
            (true, Some(predicate)) => {
                let bindings = single_binding(predicate.params.as_slice(), element)?;
                w.keyword("COUNT(CASE WHEN ");
                self.with_scope(bindings, || {
                    self.write_condition(w, &predicate.body, Polarity::Positive)
                })?;
                w.keyword(" THEN 1 END)");
            }
            (false, Some(selector)) => {
                let bindings = single_binding(selector.params.as_slice(), element)?;
                w.write(format!("{}(", function.as_sql()));
                self.with_scope(bindings, || self.write(w, &selector.body))?;
                w.close_brace();
            }
            (false, None) => match element {
                Shape::Scalar(sql) => w.write(format!("{}({sql})", function.as_sql())),
                other => {
                    return Err(Error::unsupported_operator(
                        &call.name,
                        format!("needs a selector over a group of {}", other.kind()),
                    ));
                }
            },
        }
        Ok(())
    }

    fn write_custom(&self, w: &mut Writer, call: &Call) -> Result<()> {
        match self.custom(call) {
            Some(visitor) => {
                tracing::trace!(method = %call.name, "Delegating call to custom visitor");
                visitor.visit(self, w, call)
            }
            None => Err(Error::unsupported_operator(
                &call.name,
                format!("no translation for {}", call.signature()),
            )),
        }
    }

    // ==================== Conditions ====================

    /// Write `expr` as a predicate with the given polarity.
    pub fn write_condition(&self, w: &mut Writer, expr: &Expr, polarity: Polarity) -> Result<()> {
        match expr {
            Expr::Binary { left, op, right } if op.is_logical() => {
                w.open_brace();
                self.write_condition(w, left, polarity)?;
                w.logical(*op, polarity);
                self.write_condition(w, right, polarity)?;
                w.close_brace();
                Ok(())
            }
            Expr::Binary { left, op, right } if op.is_comparison() => {
                self.write_comparison(w, left, *op, right, polarity)
            }
            Expr::Unary {
                op: UnaryOp::Not,
                expr: inner,
            } => self.write_condition(w, inner, polarity.negate()),
            Expr::Constant(Value::Bool(b))
            | Expr::Variable {
                value: Value::Bool(b),
                ..
            } => {
                w.truth(*b, polarity);
                Ok(())
            }
            Expr::Call(call) if call.op.is_some() => self.write_subquery(w, call, polarity, true),
            Expr::Call(call) => self.write_method_condition(w, call, polarity),
            Expr::Parameter(_) | Expr::Member { .. } | Expr::Conditional { .. } => {
                self.write(w, expr)?;
                w.compare(BinaryOp::Eq, polarity);
                let yes = w.settings().bool_literal(true);
                w.write(yes);
                Ok(())
            }
            other => Err(Error::unsupported(format!(
                "a {} cannot be used as a condition",
                other.kind()
            ))),
        }
    }

    fn write_comparison(
        &self,
        w: &mut Writer,
        left: &Expr,
        op: BinaryOp,
        right: &Expr,
        polarity: Polarity,
    ) -> Result<()> {
        let null_polarity = match op {
            BinaryOp::Eq => Some(polarity),
            BinaryOp::Ne => Some(polarity.negate()),
            _ => None,
        };
        if let Some(null_polarity) = null_polarity {
            if is_null(right) {
                self.write(w, left)?;
                w.is_null(null_polarity);
                return Ok(());
            }
            if is_null(left) {
                self.write(w, right)?;
                w.is_null(null_polarity);
                return Ok(());
            }
        }

        self.write(w, left)?;
        w.compare(op, polarity);
        self.write(w, right)
    }

    fn write_method_condition(&self, w: &mut Writer, call: &Call, polarity: Polarity) -> Result<()> {
        match Method::from_name(&call.name) {
            Some(method @ (Method::Contains | Method::StartsWith | Method::EndsWith)) => {
                let receiver = arg(call, 0)?;
                let needle = arg(call, 1)?;
                if method == Method::Contains {
                    if let Some((base, values)) = list_value(receiver) {
                        return self.write_in_list(w, needle, base, values, polarity);
                    }
                }
                self.write_like(w, method, receiver, needle, polarity)
            }
            Some(Method::IsNullOrEmpty) => {
                let receiver = arg(call, 0)?;
                let operand = w.capture(|w| self.write(w, receiver))?;
                w.open_brace();
                w.write(operand.clone());
                w.is_null(polarity);
                w.logical(BinaryOp::Or, polarity);
                w.write(operand);
                w.compare(BinaryOp::Eq, polarity);
                w.write("''");
                w.close_brace();
                Ok(())
            }
            _ => match self.custom(call) {
                Some(visitor) if polarity.is_negated() => {
                    w.keyword("NOT (");
                    visitor.visit(self, w, call)?;
                    w.close_brace();
                    Ok(())
                }
                Some(visitor) => visitor.visit(self, w, call),
                None => Err(Error::unsupported_operator(
                    &call.name,
                    format!("no translation for {}", call.signature()),
                )),
            },
        }
    }

    fn write_in_list(
        &self,
        w: &mut Writer,
        needle: &Expr,
        base: &str,
        values: &[Value],
        polarity: Polarity,
    ) -> Result<()> {
        if values.is_empty() {
            w.truth(false, polarity);
            return Ok(());
        }
        self.write(w, needle)?;
        w.in_list(polarity);
        w.open_brace();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                w.delimiter();
            }
            w.parameter(base, value.clone());
        }
        w.close_brace();
        Ok(())
    }

    fn write_like(
        &self,
        w: &mut Writer,
        method: Method,
        receiver: &Expr,
        needle: &Expr,
        polarity: Polarity,
    ) -> Result<()> {
        self.write(w, receiver)?;
        w.like(polarity);

        if let Some((base, text)) = literal_text(needle) {
            let escaped = escape_like(text);
            let pattern = match method {
                Method::StartsWith => format!("{escaped}%"),
                Method::EndsWith => format!("%{escaped}"),
                _ => format!("%{escaped}%"),
            };
            w.parameter(base, Value::Text(pattern));
            if escaped != text {
                w.keyword(" ESCAPE '!'");
            }
            return Ok(());
        }

        let needle_sql = w.capture(|w| self.write(w, needle))?;
        let wildcard = "'%'".to_string();
        let parts = match method {
            Method::StartsWith => vec![needle_sql, wildcard],
            Method::EndsWith => vec![wildcard, needle_sql],
            _ => vec![wildcard.clone(), needle_sql, wildcard],
        };
        let sql = w.settings().concat(&parts);
        w.write(sql);
        Ok(())
    }

    // ==================== Subqueries ====================

    /// A chain operator inside a lambda body: `EXISTS`, `IN` or a scalar
    /// subquery, correlated through the enclosing scopes.
    fn write_subquery(
        &self,
        w: &mut Writer,
        call: &Call,
        polarity: Polarity,
        condition: bool,
    ) -> Result<()> {
        let state = self.walk_call(w, call, true)?;
        let mode = match state.terminal {
            Terminal::Rows => RenderMode::Derived,
            _ => RenderMode::Top,
        };
        let sql = state.block.render(&state.shape, mode, w)?;

        match (&state.terminal, condition) {
            (terminal @ (Terminal::Exists { .. } | Terminal::In { .. }), true) => {
                write_predicate(w, terminal, &sql, polarity);
                Ok(())
            }
            (terminal @ (Terminal::Exists { .. } | Terminal::In { .. }), false) => {
                self.case_when(w, |w| {
                    write_predicate(w, terminal, &sql, Polarity::Positive);
                    Ok(())
                })
            }
            (Terminal::Scalar | Terminal::Rows, false) => {
                w.open_brace();
                w.write(sql);
                w.close_brace();
                Ok(())
            }
            (Terminal::Scalar | Terminal::Rows, true) => Err(Error::unsupported_operator(
                &call.name,
                "does not produce a condition",
            )),
        }
    }
}

/// `[NOT] EXISTS(sql)` or `needle [NOT] IN (sql)`.
pub(crate) fn write_predicate(w: &mut Writer, terminal: &Terminal, sql: &str, polarity: Polarity) {
    match terminal {
        Terminal::Exists { negated } => {
            w.exists(if *negated {
                polarity.negate()
            } else {
                polarity
            });
            w.open_brace();
            w.write(sql);
            w.close_brace();
        }
        Terminal::In { needle } => {
            w.write(needle.as_str());
            w.in_list(polarity);
            w.open_brace();
            w.write(sql);
            w.close_brace();
        }
        Terminal::Rows | Terminal::Scalar => w.write(sql),
    }
}

fn arg(call: &Call, index: usize) -> Result<&Expr> {
    call.args.get(index).ok_or_else(|| {
        Error::unsupported_operator(&call.name, format!("missing argument {index}"))
    })
}

fn single_binding(params: &[String], shape: Shape) -> Result<Vec<(String, Shape)>> {
    match params {
        [param] => Ok(vec![(param.clone(), shape)]),
        _ => Err(Error::unsupported(format!(
            "expected a one-parameter lambda, got {} parameters",
            params.len()
        ))),
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Constant(Value::Null)
            | Expr::Variable {
                value: Value::Null,
                ..
            }
    )
}

fn literal_text(expr: &Expr) -> Option<(&str, &str)> {
    match expr {
        Expr::Constant(Value::Text(text)) => Some(("p", text)),
        Expr::Variable {
            name,
            value: Value::Text(text),
        } => Some((name, text)),
        _ => None,
    }
}

fn list_value(expr: &Expr) -> Option<(&str, &[Value])> {
    match expr {
        Expr::Constant(Value::Array(values)) => Some(("p", values)),
        Expr::Variable {
            name,
            value: Value::Array(values),
        } => Some((name, values)),
        _ => None,
    }
}

/// Escape LIKE wildcards with `!`.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '!' | '%' | '_' | '[') {
            out.push('!');
        }
        out.push(c);
    }
    out
}
