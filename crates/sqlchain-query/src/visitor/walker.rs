//! Operator chain walking.
//!
//! The walker descends to the source of a chain and applies each operator
//! on the way back up, folding it into the current [`SelectBlock`]. When an
//! operator cannot be absorbed (a filter after paging, a second grouping, a
//! set operation) the block is rendered as a derived table and a fresh block
//! starts on top of it.

use std::sync::Arc;

use sqlchain_core::{Error, Result, Value};

use super::expression::{ExpressionWriter, write_predicate};
use super::select::{
    FromItem, JoinClause, JoinType, Leaf, OrderKey, RenderMode, SelectBlock, Shape, qualified,
};
use crate::dispatch::{AggregateFunction, ElementKind, JoinKind, Operator, SetOperator};
use crate::expr::{BinaryOp, Call, Expr, Lambda, SqlHook, TableSource};
use crate::writer::{Polarity, Writer};

/// Read-side settings collected from the chain.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReadPolicy {
    pub required: bool,
    pub has_default_value: bool,
    pub default_value: Option<Value>,
    pub missing_data_message: Option<String>,
    pub time_out: Option<u32>,
    pub hooks: Vec<SqlHook>,
}

/// What the outermost SELECT produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Terminal {
    Rows,
    Scalar,
    Exists { negated: bool },
    In { needle: String },
}

/// Walk state for one chain.
#[derive(Debug, Clone)]
pub(crate) struct QueryState {
    pub block: SelectBlock,
    pub shape: Shape,
    pub grouped: bool,
    pub terminal: Terminal,
    pub qualify: bool,
    pub policy: ReadPolicy,
}

impl QueryState {
    fn source(source: &TableSource, qualify: bool) -> Self {
        Self {
            block: SelectBlock::new(FromItem::Table {
                name: source.info.table_name.clone(),
                alias: None,
            }),
            shape: Shape::Entity {
                alias: None,
                info: Arc::clone(&source.info),
            },
            grouped: false,
            terminal: Terminal::Rows,
            qualify,
            policy: ReadPolicy::default(),
        }
    }
}

impl ExpressionWriter<'_> {
    /// Walk a query chain with table aliases.
    pub(crate) fn walk(&self, w: &mut Writer, expr: &Expr) -> Result<QueryState> {
        self.walk_query(w, expr, true)
    }

    /// Walk a query chain without aliasing its table, for write statements.
    pub(crate) fn walk_unqualified(&self, w: &mut Writer, expr: &Expr) -> Result<QueryState> {
        self.walk_query(w, expr, false)
    }

    fn walk_query(&self, w: &mut Writer, expr: &Expr, qualify: bool) -> Result<QueryState> {
        match expr {
            Expr::Source(source) => Ok(QueryState::source(source, qualify)),
            Expr::Call(call) => self.walk_call(w, call, qualify),
            other => Err(Error::unsupported(format!(
                "a {} is not a query source",
                other.kind()
            ))),
        }
    }

    pub(crate) fn walk_call(&self, w: &mut Writer, call: &Call, qualify: bool) -> Result<QueryState> {
        let op = call.op.ok_or_else(|| {
            Error::unsupported_operator(
                &call.name,
                format!("no operator matches {}", call.signature()),
            )
        })?;
        let receiver = call
            .receiver()
            .ok_or_else(|| Error::unsupported_operator(&call.name, "missing source argument"))?;

        let mut state = self.walk_query(w, receiver, qualify)?;
        tracing::trace!(operator = %call.name, ?op, "Applying operator");
        self.apply(w, &mut state, op, call)?;
        Ok(state)
    }

    fn apply(&self, w: &mut Writer, state: &mut QueryState, op: Operator, call: &Call) -> Result<()> {
        match op {
            Operator::Where | Operator::TakeWhile => {
                self.filter(w, state, lambda_arg(call, 1)?, Polarity::Positive)
            }
            Operator::SkipWhile => self.filter(w, state, lambda_arg(call, 1)?, Polarity::Negated),
            Operator::Select => self.select(w, state, lambda_arg(call, 1)?),
            Operator::SelectMany { result } => self.select_many(w, state, call, result),
            Operator::Join(kind) => self.join(w, state, call, kind),
            Operator::OrderBy { descending, then } => {
                self.order_by(w, state, lambda_arg(call, 1)?, descending, then)
            }
            Operator::Take => {
                let n = count_arg(call, 1)?;
                page(&mut state.block, Some(n), 0);
                Ok(())
            }
            Operator::Skip => {
                let n = count_arg(call, 1)?;
                page(&mut state.block, None, n);
                Ok(())
            }
            Operator::TakeLast => {
                let n = count_arg(call, 1)?;
                self.from_end(w, state, &call.name, Some(n), 0)
            }
            Operator::SkipLast => {
                let n = count_arg(call, 1)?;
                self.from_end(w, state, &call.name, None, n)
            }
            Operator::Reverse => {
                self.reorderable(w, state, &call.name)?;
                state.block.flip_order();
                Ok(())
            }
            Operator::Distinct => {
                if state.block.is_paged() {
                    self.wrap(w, state)?;
                }
                state.block.distinct = true;
                Ok(())
            }
            Operator::GroupBy { element, result } => self.group_by(w, state, call, element, result),
            Operator::SetOp(set) => self.set_op(w, state, call, set),
            Operator::Aggregate { function, lambda } => {
                self.aggregate(w, state, call, function, lambda)
            }
            Operator::Element {
                kind,
                or_default,
                predicate,
                default,
            } => {
                if predicate {
                    self.filter(w, state, lambda_arg(call, 1)?, Polarity::Positive)?;
                }
                self.element(w, state, call, kind)?;
                state.policy.required = !or_default;
                state.policy.has_default_value = or_default;
                if default {
                    let last = call.args.len().saturating_sub(1);
                    state.policy.default_value = Some(value_arg(call, last)?);
                }
                Ok(())
            }
            Operator::Any { predicate } => {
                if predicate {
                    self.filter(w, state, lambda_arg(call, 1)?, Polarity::Positive)?;
                }
                quantify(state, Terminal::Exists { negated: false });
                Ok(())
            }
            Operator::All => {
                self.filter(w, state, lambda_arg(call, 1)?, Polarity::Negated)?;
                quantify(state, Terminal::Exists { negated: true });
                Ok(())
            }
            Operator::Contains => self.contains(w, state, call),
            Operator::Cast | Operator::OfType => Ok(()),
            Operator::DefaultIfEmpty { value } => {
                if value {
                    state.policy.has_default_value = true;
                    state.policy.default_value = Some(value_arg(call, 1)?);
                }
                Ok(())
            }
            Operator::From => rename_source(state, call),
            Operator::TimeOut => {
                let secs = count_arg(call, 1)?;
                let secs = u32::try_from(secs).map_err(|_| {
                    Error::Argument(format!("{} of {secs} seconds is out of range", call.name))
                })?;
                state.policy.time_out = Some(secs);
                Ok(())
            }
            Operator::NoResultError => {
                let value = value_arg(call, 1)?;
                let message = value.as_str().ok_or_else(|| {
                    Error::Argument(format!(
                        "{} expects a message, got {}",
                        call.name,
                        value.type_name()
                    ))
                })?;
                state.policy.missing_data_message = Some(message.to_string());
                Ok(())
            }
            Operator::WatchSql => match call.args.get(1) {
                Some(Expr::Hook(hook)) => {
                    state.policy.hooks.push(hook.clone());
                    Ok(())
                }
                _ => Err(Error::Argument(format!("{} expects a hook", call.name))),
            },
            Operator::Insert { .. } | Operator::Update { .. } | Operator::Delete { .. } => {
                Err(Error::unsupported_operator(
                    &call.name,
                    "write operators must be the outermost call of an execute tree",
                ))
            }
        }
    }

    // ==================== Binding ====================

    /// Give an unaliased table source its alias, preferring `preferred`.
    fn claim(&self, state: &mut QueryState, preferred: Option<&str>) {
        if !state.qualify {
            return;
        }
        let FromItem::Table { alias, .. } = &mut state.block.from else {
            return;
        };
        if alias.is_some() {
            return;
        }
        let name = self.allocate_alias(preferred);
        if let Shape::Entity {
            alias: shape_alias @ None,
            ..
        } = &mut state.shape
        {
            *shape_alias = Some(name.clone());
        }
        *alias = Some(name);
    }

    /// Bind a one-parameter lambda to the current row shape.
    fn bind(&self, state: &mut QueryState, lambda: &Lambda) -> Result<Vec<(String, Shape)>> {
        let [param] = lambda.params.as_slice() else {
            return Err(Error::unsupported(format!(
                "expected a one-parameter lambda, got {} parameters",
                lambda.arity()
            )));
        };
        self.claim(state, Some(param));
        Ok(vec![(param.clone(), state.shape.clone())])
    }

    // ==================== Wrapping ====================

    /// Render the current block as a derived table and continue on top of
    /// it. Sort keys that are projected survive; others are dropped.
    pub(crate) fn wrap(&self, w: &mut Writer, state: &mut QueryState) -> Result<()> {
        let alias = self.allocate_alias(None);
        let leaves = state.shape.leaves(w)?;
        let hoisted: Vec<OrderKey> = state
            .block
            .order_by
            .iter()
            .filter_map(|key| {
                leaves.iter().find(|leaf| leaf.sql == key.sql).map(|leaf| OrderKey {
                    sql: qualified(w, Some(&alias), &leaf.name),
                    descending: key.descending,
                })
            })
            .collect();
        if hoisted.len() < state.block.order_by.len() {
            tracing::trace!(
                dropped = state.block.order_by.len() - hoisted.len(),
                "Sort keys outside the projection do not survive wrapping"
            );
        }

        let sql = state.block.render(&state.shape, RenderMode::Derived, w)?;
        state.shape = state.shape.rebind(&alias, w)?;
        state.block = SelectBlock::new(FromItem::Derived {
            sql,
            alias,
            compound: false,
        });
        state.block.order_by = hoisted;
        state.grouped = false;
        Ok(())
    }

    /// Operators that reverse the sort need one, and paging before them
    /// must be sealed into a derived table first.
    fn reorderable(&self, w: &mut Writer, state: &mut QueryState, name: &str) -> Result<()> {
        if state.block.order_by.is_empty() {
            return Err(Error::unsupported_operator(name, "requires a preceding OrderBy"));
        }
        if state.block.is_paged() {
            require_projected_order(state, &state.shape.leaves(w)?, name)?;
            self.wrap(w, state)?;
        }
        Ok(())
    }

    // ==================== Row Operators ====================

    fn filter(
        &self,
        w: &mut Writer,
        state: &mut QueryState,
        lambda: &Lambda,
        polarity: Polarity,
    ) -> Result<()> {
        if state.block.is_sealed() {
            self.wrap(w, state)?;
        }
        let bindings = self.bind(state, lambda)?;
        let sql = w.capture(|w| {
            self.with_scope(bindings, || self.write_condition(w, &lambda.body, polarity))
        })?;
        if state.grouped {
            state.block.having.push(sql);
        } else {
            state.block.filters.push(sql);
        }
        Ok(())
    }

    fn select(&self, w: &mut Writer, state: &mut QueryState, lambda: &Lambda) -> Result<()> {
        if state.block.distinct {
            self.wrap(w, state)?;
        }
        let bindings = self.bind(state, lambda)?;
        state.shape = self.with_scope(bindings, || self.project(w, &lambda.body))?;
        Ok(())
    }

    fn order_by(
        &self,
        w: &mut Writer,
        state: &mut QueryState,
        lambda: &Lambda,
        descending: bool,
        then: bool,
    ) -> Result<()> {
        if state.block.is_sealed() {
            self.wrap(w, state)?;
        }
        if !then {
            state.block.order_by.clear();
        }
        let bindings = self.bind(state, lambda)?;
        let key = self.with_scope(bindings, || self.project(w, &lambda.body))?;
        for leaf in key.leaves(w)? {
            state.block.order_by.push(OrderKey {
                sql: leaf.sql,
                descending,
            });
        }
        Ok(())
    }

    /// TakeLast / SkipLast: page the reversed order, then restore it.
    fn from_end(
        &self,
        w: &mut Writer,
        state: &mut QueryState,
        name: &str,
        take: Option<u64>,
        skip: u64,
    ) -> Result<()> {
        if state.block.order_by.is_empty() {
            return Err(Error::unsupported_operator(name, "requires a preceding OrderBy"));
        }
        require_projected_order(state, &state.shape.leaves(w)?, name)?;
        if state.block.is_paged() {
            self.wrap(w, state)?;
        }
        state.block.flip_order();
        page(&mut state.block, take, skip);
        self.wrap(w, state)?;
        state.block.flip_order();
        Ok(())
    }

    fn element(
        &self,
        w: &mut Writer,
        state: &mut QueryState,
        call: &Call,
        kind: ElementKind,
    ) -> Result<()> {
        match kind {
            ElementKind::First => page(&mut state.block, Some(1), 0),
            // Two rows are enough to detect a second match
            ElementKind::Single => page(&mut state.block, Some(2), 0),
            ElementKind::Last => {
                self.reorderable(w, state, &call.name)?;
                state.block.flip_order();
                page(&mut state.block, Some(1), 0);
            }
            ElementKind::ElementAt => {
                let index = count_arg(call, 1)?;
                page(&mut state.block, None, index);
                page(&mut state.block, Some(1), 0);
            }
        }
        Ok(())
    }

    // ==================== Joins ====================

    fn select_many(
        &self,
        w: &mut Writer,
        state: &mut QueryState,
        call: &Call,
        result: bool,
    ) -> Result<()> {
        if state.block.is_sealed() {
            self.wrap(w, state)?;
        }
        let selector = lambda_arg(call, 1)?;
        let outer = self.bind(state, selector)?;

        // Peel `inner.Where(..).DefaultIfEmpty()` down to its table
        let mut node = &selector.body;
        let mut left = false;
        let mut predicates: Vec<&Lambda> = Vec::new();
        let source = loop {
            let inner = match node {
                Expr::Source(source) => break source,
                Expr::Call(inner) => inner,
                other => {
                    return Err(Error::unsupported_operator(
                        &call.name,
                        format!("cannot flatten a {}", other.kind()),
                    ));
                }
            };
            match inner.op {
                Some(Operator::DefaultIfEmpty { value: false }) if predicates.is_empty() && !left => {
                    left = true;
                }
                Some(Operator::Where) => predicates.push(lambda_arg(inner, 1)?),
                _ => {
                    return Err(Error::unsupported_operator(
                        &call.name,
                        format!("cannot flatten through {}", inner.name),
                    ));
                }
            }
            node = inner
                .receiver()
                .ok_or_else(|| Error::unsupported_operator(&inner.name, "missing source argument"))?;
        };

        let result_selector = if result {
            Some(lambda_arg(call, 2)?)
        } else {
            None
        };
        let preferred = result_selector
            .and_then(|l| l.params.get(1))
            .or_else(|| predicates.first().and_then(|l| l.params.first()))
            .map(String::as_str);
        let inner_alias = self.allocate_alias(preferred);
        let inner_shape = Shape::Entity {
            alias: Some(inner_alias.clone()),
            info: Arc::clone(&source.info),
        };

        let mut on = Vec::new();
        for predicate in predicates.iter().rev() {
            let [param] = predicate.params.as_slice() else {
                return Err(Error::unsupported_operator(
                    &call.name,
                    "collection filters take one parameter",
                ));
            };
            let mut scope = outer.clone();
            scope.push((param.clone(), inner_shape.clone()));
            on.push(w.capture(|w| {
                self.with_scope(scope, || {
                    self.write_condition(w, &predicate.body, Polarity::Positive)
                })
            })?);
        }

        let (kind, on) = match (left, on.is_empty()) {
            (false, true) => (JoinType::Cross, None),
            (true, true) => (JoinType::Left, Some("1=1".to_string())),
            (true, false) => (JoinType::Left, Some(on.join(" AND "))),
            (false, false) => (JoinType::Inner, Some(on.join(" AND "))),
        };
        state.block.joins.push(JoinClause {
            kind,
            source: FromItem::Table {
                name: source.info.table_name.clone(),
                alias: Some(inner_alias),
            },
            on,
        });

        state.shape = match result_selector {
            Some(selector) => {
                let [a, b] = selector.params.as_slice() else {
                    return Err(Error::unsupported_operator(
                        &call.name,
                        "the result selector takes two parameters",
                    ));
                };
                let bindings = vec![(a.clone(), state.shape.clone()), (b.clone(), inner_shape)];
                self.with_scope(bindings, || self.project(w, &selector.body))?
            }
            None => inner_shape,
        };
        Ok(())
    }

    fn join(&self, w: &mut Writer, state: &mut QueryState, call: &Call, kind: JoinKind) -> Result<()> {
        if state.block.is_sealed() {
            self.wrap(w, state)?;
        }
        let inner_expr = call
            .args
            .get(1)
            .ok_or_else(|| Error::unsupported_operator(&call.name, "missing inner query"))?;
        let outer_key = lambda_arg(call, 2)?;
        let inner_key = lambda_arg(call, 3)?;
        let result = lambda_arg(call, 4)?;

        let outer = self.bind(state, outer_key)?;
        let mut inner = self.walk(w, inner_expr)?;
        let movable = matches!(inner.block.from, FromItem::Table { .. })
            && inner.block.joins.is_empty()
            && inner.block.group_by.is_empty()
            && !inner.block.is_sealed()
            && !inner.grouped;
        if !movable {
            self.wrap(w, &mut inner)?;
        }
        let inner_bindings = self.bind(&mut inner, inner_key)?;

        let outer_parts = self
            .with_scope(outer, || self.project(w, &outer_key.body))?
            .leaves(w)?;
        let inner_parts = self
            .with_scope(inner_bindings, || self.project(w, &inner_key.body))?
            .leaves(w)?;
        if outer_parts.len() != inner_parts.len() {
            return Err(Error::Argument(format!(
                "{} keys differ in arity: {} outer, {} inner",
                call.name,
                outer_parts.len(),
                inner_parts.len()
            )));
        }

        let mut on: Vec<String> = outer_parts
            .iter()
            .zip(&inner_parts)
            .map(|(o, i)| format!("{} {} {}", o.sql, BinaryOp::Eq.as_str(), i.sql))
            .collect();
        on.append(&mut inner.block.filters);

        let [a, b] = result.params.as_slice() else {
            return Err(Error::unsupported_operator(
                &call.name,
                "the result selector takes two parameters",
            ));
        };
        let bindings = vec![
            (a.clone(), state.shape.clone()),
            (b.clone(), inner.shape.clone()),
        ];
        state.shape = self.with_scope(bindings, || self.project(w, &result.body))?;
        state.block.joins.push(JoinClause {
            kind: match kind {
                JoinKind::Inner => JoinType::Inner,
                JoinKind::LeftOuter => JoinType::Left,
            },
            source: inner.block.from,
            on: Some(on.join(" AND ")),
        });
        Ok(())
    }

    // ==================== Grouping ====================

    fn group_by(
        &self,
        w: &mut Writer,
        state: &mut QueryState,
        call: &Call,
        element: bool,
        result: bool,
    ) -> Result<()> {
        if state.block.is_sealed() || state.grouped {
            self.wrap(w, state)?;
        }
        let key_selector = lambda_arg(call, 1)?;
        let bindings = self.bind(state, key_selector)?;
        let key = self.with_scope(bindings, || self.project(w, &key_selector.body))?;

        let element_shape = if element {
            let selector = lambda_arg(call, 2)?;
            let bindings = self.bind(state, selector)?;
            self.with_scope(bindings, || self.project(w, &selector.body))?
        } else {
            state.shape.clone()
        };

        state.block.group_by = key.leaves(w)?.into_iter().map(|leaf| leaf.sql).collect();
        state.block.order_by.clear();
        state.grouped = true;

        let group = Shape::Group {
            key: Box::new(key.clone()),
            element: Box::new(element_shape),
        };
        state.shape = if result {
            let selector = lambda_arg(call, if element { 3 } else { 2 })?;
            let [k, g] = selector.params.as_slice() else {
                return Err(Error::unsupported_operator(
                    &call.name,
                    "the result selector takes two parameters",
                ));
            };
            let bindings = vec![(k.clone(), key), (g.clone(), group)];
            self.with_scope(bindings, || self.project(w, &selector.body))?
        } else {
            group
        };
        Ok(())
    }

    // ==================== Set Operations ====================

    fn set_op(&self, w: &mut Writer, state: &mut QueryState, call: &Call, set: SetOperator) -> Result<()> {
        let other = call
            .args
            .get(1)
            .ok_or_else(|| Error::unsupported_operator(&call.name, "missing second query"))?;
        let mut right = self.walk(w, other)?;

        // Operands that are paged or already compound keep their meaning
        // only as derived tables
        if needs_isolation(state) {
            self.wrap(w, state)?;
        }
        if needs_isolation(&right) {
            self.wrap(w, &mut right)?;
        }

        let left_sql = state.block.render(&state.shape, RenderMode::Derived, w)?;
        let right_sql = right.block.render(&right.shape, RenderMode::Derived, w)?;
        let alias = self.allocate_alias(None);
        state.shape = state.shape.rebind(&alias, w)?;
        state.block = SelectBlock::new(FromItem::Derived {
            sql: format!("{left_sql} {} {right_sql}", set.as_sql()),
            alias,
            compound: true,
        });
        state.grouped = false;
        Ok(())
    }

    // ==================== Terminals ====================

    fn aggregate(
        &self,
        w: &mut Writer,
        state: &mut QueryState,
        call: &Call,
        function: AggregateFunction,
        lambda: bool,
    ) -> Result<()> {
        let groups = matches!(state.shape, Shape::Group { .. });
        if groups {
            self.group_rows(w, state, call, function, lambda)?;
        } else if state.block.is_sealed() || state.grouped {
            self.wrap(w, state)?;
        }

        let sql = if function.is_count() {
            if lambda && !groups {
                self.filter(w, state, lambda_arg(call, 1)?, Polarity::Positive)?;
            }
            "COUNT(*)".to_string()
        } else {
            let operand = if lambda {
                let selector = lambda_arg(call, 1)?;
                let bindings = self.bind(state, selector)?;
                w.capture(|w| self.with_scope(bindings, || self.write(w, &selector.body)))?
            } else {
                match &state.shape {
                    Shape::Scalar(sql) => sql.clone(),
                    other => {
                        return Err(Error::unsupported_operator(
                            &call.name,
                            format!("needs a selector over a {}", other.kind()),
                        ));
                    }
                }
            };
            format!("{}({operand})", function.as_sql())
        };

        state.shape = Shape::Scalar(sql);
        state.block.order_by.clear();
        state.terminal = Terminal::Scalar;
        Ok(())
    }

    /// Count over groups: one row per group, identified by its key. A
    /// predicate over the group becomes a HAVING clause before the grouped
    /// block is wrapped.
    fn group_rows(
        &self,
        w: &mut Writer,
        state: &mut QueryState,
        call: &Call,
        function: AggregateFunction,
        lambda: bool,
    ) -> Result<()> {
        if !function.is_count() {
            return Err(Error::unsupported_operator(
                &call.name,
                "groups can only be counted; select from the group first",
            ));
        }
        if lambda {
            self.filter(w, state, lambda_arg(call, 1)?, Polarity::Positive)?;
        }
        if let Shape::Group { key, .. } = &state.shape {
            state.shape = (**key).clone();
        }
        self.wrap(w, state)
    }

    fn contains(&self, w: &mut Writer, state: &mut QueryState, call: &Call) -> Result<()> {
        if !matches!(state.shape, Shape::Scalar(_)) {
            return Err(Error::unsupported_operator(
                &call.name,
                format!("requires a single projected column, not a {}", state.shape.kind()),
            ));
        }
        let needle = call
            .args
            .get(1)
            .ok_or_else(|| Error::unsupported_operator(&call.name, "missing value argument"))?;
        let needle = w.capture(|w| self.write(w, needle))?;
        if !state.block.is_paged() {
            state.block.order_by.clear();
        }
        state.terminal = Terminal::In { needle };
        Ok(())
    }

    /// Render a walked chain as the outermost statement.
    pub(crate) fn render_query(&self, w: &mut Writer, state: &QueryState) -> Result<String> {
        let sql = state.block.render(&state.shape, RenderMode::Top, w)?;
        match &state.terminal {
            Terminal::Rows | Terminal::Scalar => Ok(sql),
            terminal => w.capture(|w| {
                w.keyword("SELECT CASE WHEN ");
                write_predicate(w, terminal, &sql, Polarity::Positive);
                w.keyword(" THEN ");
                let yes = w.settings().bool_literal(true);
                w.write(yes);
                w.keyword(" ELSE ");
                let no = w.settings().bool_literal(false);
                w.write(no);
                w.keyword(" END");
                Ok(())
            }),
        }
    }
}

fn page(block: &mut SelectBlock, take: Option<u64>, skip: u64) {
    if let Some(n) = take {
        block.take = Some(block.take.map_or(n, |t| t.min(n)));
    }
    if skip > 0 {
        block.take = block.take.map(|t| t.saturating_sub(skip));
        block.skip = block.skip.saturating_add(skip);
    }
}

fn quantify(state: &mut QueryState, terminal: Terminal) {
    state.shape = Shape::Scalar("1".to_string());
    if !state.block.is_paged() {
        state.block.order_by.clear();
    }
    state.terminal = terminal;
}

fn needs_isolation(state: &QueryState) -> bool {
    state.block.is_paged()
        || matches!(
            state.block.from,
            FromItem::Derived {
                compound: true,
                ..
            }
        )
}

fn require_projected_order(state: &QueryState, leaves: &[Leaf], name: &str) -> Result<()> {
    let projected = state
        .block
        .order_by
        .iter()
        .all(|key| leaves.iter().any(|leaf| leaf.sql == key.sql));
    if projected {
        Ok(())
    } else {
        Err(Error::unsupported_operator(
            name,
            "requires every sort key to be part of the projection",
        ))
    }
}

fn rename_source(state: &mut QueryState, call: &Call) -> Result<()> {
    let value = value_arg(call, 1)?;
    let table = value
        .as_str()
        .ok_or_else(|| Error::Argument(format!("{} expects a table name", call.name)))?
        .to_string();
    match &mut state.block.from {
        FromItem::Table { name, .. } => {
            *name = table;
            Ok(())
        }
        FromItem::Derived { .. } => Err(Error::unsupported_operator(
            &call.name,
            "applies only to a table source",
        )),
    }
}

fn lambda_arg(call: &Call, index: usize) -> Result<&Lambda> {
    call.lambda(index).ok_or_else(|| {
        Error::unsupported_operator(&call.name, format!("argument {index} must be a lambda"))
    })
}

fn value_arg(call: &Call, index: usize) -> Result<Value> {
    match call.args.get(index) {
        Some(Expr::Constant(value) | Expr::Variable { value, .. }) => Ok(value.clone()),
        Some(other) => Err(Error::Argument(format!(
            "{} expects a value, got a {}",
            call.name,
            other.kind()
        ))),
        None => Err(Error::Argument(format!(
            "{} is missing argument {index}",
            call.name
        ))),
    }
}

fn count_arg(call: &Call, index: usize) -> Result<u64> {
    let value = value_arg(call, index)?;
    let n = value.as_i64().ok_or_else(|| {
        Error::Argument(format!(
            "{} expects an integer, got {}",
            call.name,
            value.type_name()
        ))
    })?;
    u64::try_from(n)
        .map_err(|_| Error::Argument(format!("{} expects a non-negative count, got {n}", call.name)))
}
