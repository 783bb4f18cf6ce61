//! Fluent chain builders.
//!
//! [`Query`] assembles an operator-chain [`Expr`] one call at a time, so the
//! tree can be built without writing `Expr::call` by hand. Terminal
//! operators (`count`, `first`, `any`, ...) return a [`TerminalQuery`] and
//! the write operators a [`WriteQuery`]; neither can be chained further.

use std::fmt;
use std::marker::PhantomData;

use sqlchain_core::{Entity, Error, Result, TableRegistry, Value};

use crate::command::{CommandSql, TypedCommandSql};
use crate::config::TranslateConfig;
use crate::expr::{Expr, Lambda, SqlHook, TableSource};
use crate::visitor::{ExecuteVisitor, QueryVisitor};

/// A row-producing chain rooted at the table of `T`.
///
/// `T` only names the root entity; projections keep the type and change
/// the row shape of the tree.
pub struct Query<T> {
    expr: Expr,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("expr", &self.expr).finish()
    }
}

impl<T: Entity> Query<T> {
    /// Start a chain over the table of `T`, resolved through the global
    /// registry.
    pub fn new() -> Self {
        Self::with_registry(TableRegistry::global())
    }

    /// Start a chain over the table of `T`, resolved through `registry`.
    pub fn with_registry(registry: &TableRegistry) -> Self {
        Self {
            expr: Expr::Source(TableSource {
                info: registry.resolve::<T>(),
            }),
            _marker: PhantomData,
        }
    }

    // ==================== Writes ====================

    /// `INSERT INTO t (...) VALUES (...)` from the members of `row`.
    pub fn insert(self, row: &T) -> WriteQuery {
        self.write("Insert", Some(row_expr(row)))
    }

    /// `INSERT INTO t (...) SELECT ...` from the rows of `source`.
    pub fn insert_from<U>(self, source: Query<U>) -> WriteQuery {
        self.write("Insert", Some(source.expr))
    }

    /// `UPDATE t SET ...` from the members `assign` builds.
    pub fn update(self, assign: Lambda) -> WriteQuery {
        self.write("Update", Some(assign.into()))
    }

    /// `UPDATE t SET ...` of one row, matched by key and tokens.
    pub fn update_row(self, row: &T) -> WriteQuery {
        self.write("Update", Some(row_expr(row)))
    }

    /// `DELETE FROM t WHERE ...` for every row the chain filters.
    pub fn delete(self) -> WriteQuery {
        self.write("Delete", None)
    }

    /// `DELETE` of one row, matched by key and tokens.
    pub fn delete_row(self, row: &T) -> WriteQuery {
        self.write("Delete", Some(row_expr(row)))
    }

    fn write(self, name: &str, arg: Option<Expr>) -> WriteQuery {
        let mut args = vec![self.expr];
        args.extend(arg);
        WriteQuery {
            expr: Expr::call(name, args),
        }
    }
}

impl<T: Entity> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Query<T> {
    fn chain(self, name: &str, args: impl IntoIterator<Item = Expr>) -> Self {
        let mut all = vec![self.expr];
        all.extend(args);
        Self {
            expr: Expr::call(name, all),
            _marker: PhantomData,
        }
    }

    fn terminal(self, name: &str, args: impl IntoIterator<Item = Expr>) -> TerminalQuery {
        let mut all = vec![self.expr];
        all.extend(args);
        TerminalQuery {
            expr: Expr::call(name, all),
        }
    }

    /// The chain as an expression tree.
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Translate the chain into a read command.
    pub fn to_query_sql<R>(&self, config: &TranslateConfig) -> Result<TypedCommandSql<R>>
    where
        R: TryFrom<Value>,
        Error: From<R::Error>,
    {
        QueryVisitor::translate(&self.expr, config)
    }

    // ==================== Filtering and Projection ====================

    pub fn filter(self, predicate: Lambda) -> Self {
        self.chain("Where", [predicate.into()])
    }

    pub fn select(self, selector: Lambda) -> Self {
        self.chain("Select", [selector.into()])
    }

    /// Flatten the query `collection` returns for every row.
    pub fn select_many(self, collection: Lambda) -> Self {
        self.chain("SelectMany", [collection.into()])
    }

    /// Flatten and project each `(outer, inner)` pair through `result`.
    pub fn select_many_with(self, collection: Lambda, result: Lambda) -> Self {
        self.chain("SelectMany", [collection.into(), result.into()])
    }

    // ==================== Joins ====================

    /// Inner join on equal keys.
    pub fn join<U>(self, inner: Query<U>, outer_key: Lambda, inner_key: Lambda, result: Lambda) -> Self {
        self.chain(
            "Join",
            [inner.expr, outer_key.into(), inner_key.into(), result.into()],
        )
    }

    /// Left outer join on equal keys.
    pub fn group_join<U>(
        self,
        inner: Query<U>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    ) -> Self {
        self.chain(
            "GroupJoin",
            [inner.expr, outer_key.into(), inner_key.into(), result.into()],
        )
    }

    // ==================== Sorting ====================

    pub fn order_by(self, key: Lambda) -> Self {
        self.chain("OrderBy", [key.into()])
    }

    pub fn order_by_descending(self, key: Lambda) -> Self {
        self.chain("OrderByDescending", [key.into()])
    }

    pub fn then_by(self, key: Lambda) -> Self {
        self.chain("ThenBy", [key.into()])
    }

    pub fn then_by_descending(self, key: Lambda) -> Self {
        self.chain("ThenByDescending", [key.into()])
    }

    /// Invert the current sort. Requires a preceding `order_by`.
    pub fn reverse(self) -> Self {
        self.chain("Reverse", [])
    }

    // ==================== Paging ====================

    /// Negative counts are rejected at translation.
    pub fn take(self, n: i64) -> Self {
        self.chain("Take", [Expr::lit(n)])
    }

    pub fn skip(self, n: i64) -> Self {
        self.chain("Skip", [Expr::lit(n)])
    }

    pub fn take_while(self, predicate: Lambda) -> Self {
        self.chain("TakeWhile", [predicate.into()])
    }

    pub fn skip_while(self, predicate: Lambda) -> Self {
        self.chain("SkipWhile", [predicate.into()])
    }

    /// Last `n` rows of the current sort.
    pub fn take_last(self, n: i64) -> Self {
        self.chain("TakeLast", [Expr::lit(n)])
    }

    /// All but the last `n` rows of the current sort.
    pub fn skip_last(self, n: i64) -> Self {
        self.chain("SkipLast", [Expr::lit(n)])
    }

    pub fn distinct(self) -> Self {
        self.chain("Distinct", [])
    }

    // ==================== Grouping ====================

    pub fn group_by(self, key: Lambda) -> Self {
        self.chain("GroupBy", [key.into()])
    }

    pub fn group_by_element(self, key: Lambda, element: Lambda) -> Self {
        self.chain("GroupBy", [key.into(), element.into()])
    }

    /// Group and project each `(key, group)` pair through `result`.
    pub fn group_by_result(self, key: Lambda, result: Lambda) -> Self {
        self.chain("GroupBy", [key.into(), result.into()])
    }

    pub fn group_by_element_result(self, key: Lambda, element: Lambda, result: Lambda) -> Self {
        self.chain("GroupBy", [key.into(), element.into(), result.into()])
    }

    // ==================== Set Combination ====================

    /// `UNION ALL`
    pub fn concat<U>(self, other: Query<U>) -> Self {
        self.chain("Concat", [other.expr])
    }

    pub fn union<U>(self, other: Query<U>) -> Self {
        self.chain("Union", [other.expr])
    }

    pub fn intersect<U>(self, other: Query<U>) -> Self {
        self.chain("Intersect", [other.expr])
    }

    pub fn except<U>(self, other: Query<U>) -> Self {
        self.chain("Except", [other.expr])
    }

    // ==================== Type Filters ====================

    pub fn cast(self) -> Self {
        self.chain("Cast", [])
    }

    pub fn of_type(self) -> Self {
        self.chain("OfType", [])
    }

    /// Keep outer rows without a match when used inside `select_many`.
    pub fn default_if_empty(self) -> Self {
        self.chain("DefaultIfEmpty", [])
    }

    pub fn default_if_empty_or(self, value: impl Into<Value>) -> Self {
        self.chain("DefaultIfEmpty", [Expr::lit(value)])
    }

    // ==================== Repository Extensions ====================

    /// Read from `table` instead of the entity's mapped table.
    pub fn from(self, table: &str) -> Self {
        self.chain("From", [Expr::lit(table)])
    }

    /// Command timeout in seconds.
    pub fn time_out(self, secs: i64) -> Self {
        self.chain("TimeOut", [Expr::lit(secs)])
    }

    /// Message for a required read that finds no row.
    pub fn no_result_error(self, message: &str) -> Self {
        self.chain("NoResultError", [Expr::lit(message)])
    }

    /// Observe the finished command once it is frozen.
    pub fn watch_sql(self, hook: impl Fn(&CommandSql) + Send + Sync + 'static) -> Self {
        self.chain("WatchSql", [Expr::Hook(SqlHook::new(hook))])
    }

    // ==================== Aggregates ====================

    pub fn count(self) -> TerminalQuery {
        self.terminal("Count", [])
    }

    pub fn count_where(self, predicate: Lambda) -> TerminalQuery {
        self.terminal("Count", [predicate.into()])
    }

    pub fn long_count(self) -> TerminalQuery {
        self.terminal("LongCount", [])
    }

    pub fn sum(self, selector: Lambda) -> TerminalQuery {
        self.terminal("Sum", [selector.into()])
    }

    pub fn average(self, selector: Lambda) -> TerminalQuery {
        self.terminal("Average", [selector.into()])
    }

    pub fn min(self, selector: Lambda) -> TerminalQuery {
        self.terminal("Min", [selector.into()])
    }

    pub fn max(self, selector: Lambda) -> TerminalQuery {
        self.terminal("Max", [selector.into()])
    }

    // ==================== Element Access ====================

    pub fn first(self) -> TerminalQuery {
        self.terminal("First", [])
    }

    pub fn first_where(self, predicate: Lambda) -> TerminalQuery {
        self.terminal("First", [predicate.into()])
    }

    pub fn first_or_default(self) -> TerminalQuery {
        self.terminal("FirstOrDefault", [])
    }

    /// `FirstOrDefault` with an explicit fallback.
    pub fn first_or(self, default: impl Into<Value>) -> TerminalQuery {
        self.terminal("FirstOrDefault", [Expr::lit(default)])
    }

    pub fn single(self) -> TerminalQuery {
        self.terminal("Single", [])
    }

    pub fn single_where(self, predicate: Lambda) -> TerminalQuery {
        self.terminal("Single", [predicate.into()])
    }

    pub fn single_or_default(self) -> TerminalQuery {
        self.terminal("SingleOrDefault", [])
    }

    pub fn single_or(self, default: impl Into<Value>) -> TerminalQuery {
        self.terminal("SingleOrDefault", [Expr::lit(default)])
    }

    /// Last row of the current sort. Requires a preceding `order_by`.
    pub fn last(self) -> TerminalQuery {
        self.terminal("Last", [])
    }

    pub fn last_where(self, predicate: Lambda) -> TerminalQuery {
        self.terminal("Last", [predicate.into()])
    }

    pub fn last_or_default(self) -> TerminalQuery {
        self.terminal("LastOrDefault", [])
    }

    pub fn last_or(self, default: impl Into<Value>) -> TerminalQuery {
        self.terminal("LastOrDefault", [Expr::lit(default)])
    }

    /// Row `n` (0-based).
    pub fn element_at(self, n: i64) -> TerminalQuery {
        self.terminal("ElementAt", [Expr::lit(n)])
    }

    pub fn element_at_or_default(self, n: i64) -> TerminalQuery {
        self.terminal("ElementAtOrDefault", [Expr::lit(n)])
    }

    // ==================== Quantifiers ====================

    pub fn any(self) -> TerminalQuery {
        self.terminal("Any", [])
    }

    pub fn any_where(self, predicate: Lambda) -> TerminalQuery {
        self.terminal("Any", [predicate.into()])
    }

    pub fn all(self, predicate: Lambda) -> TerminalQuery {
        self.terminal("All", [predicate.into()])
    }

    /// Check if the projected values include `value`.
    pub fn contains(self, value: impl Into<Expr>) -> TerminalQuery {
        self.terminal("Contains", [value.into()])
    }
}

impl<T> From<Query<T>> for Expr {
    fn from(query: Query<T>) -> Self {
        query.expr
    }
}

/// A chain closed by an aggregate, element or quantifier operator.
#[derive(Debug, Clone)]
pub struct TerminalQuery {
    expr: Expr,
}

impl TerminalQuery {
    /// The chain as an expression tree.
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Translate the chain into a read command.
    pub fn to_query_sql<R>(&self, config: &TranslateConfig) -> Result<TypedCommandSql<R>>
    where
        R: TryFrom<Value>,
        Error: From<R::Error>,
    {
        QueryVisitor::translate(&self.expr, config)
    }
}

impl From<TerminalQuery> for Expr {
    fn from(query: TerminalQuery) -> Self {
        query.expr
    }
}

/// An `Insert`, `Update` or `Delete` tree.
#[derive(Debug, Clone)]
pub struct WriteQuery {
    expr: Expr,
}

impl WriteQuery {
    /// The statement as an expression tree.
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Translate the statement into a write command.
    pub fn to_execute_sql(&self, config: &TranslateConfig) -> Result<CommandSql> {
        ExecuteVisitor::translate(&self.expr, config)
    }
}

impl From<WriteQuery> for Expr {
    fn from(query: WriteQuery) -> Self {
        query.expr
    }
}

fn row_expr<T: Entity>(row: &T) -> Expr {
    Expr::Row(
        row.to_row()
            .into_iter()
            .map(|(member, value)| (member.to_string(), value))
            .collect(),
    )
}
