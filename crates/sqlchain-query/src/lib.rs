//! Operator-chain to SQL compiler.
//!
//! `sqlchain-query` is the **translation layer**. It takes a declarative
//! chain of query operators over entity tables (`Where`, `Select`, `Join`,
//! `GroupBy`, `Take`, `First`, `Update`, ...) and produces one
//! parameterized SQL statement for a chosen dialect.
//!
//! # Role In The Architecture
//!
//! - **Expression tree**: [`Expr`] chains, usually built through [`Query`].
//! - **Dispatch**: every chain call is tagged with an [`Operator`] by name
//!   and argument shapes.
//! - **SQL writer**: [`Writer`] accumulates tokens with reserved slots,
//!   a deferred ORDER BY section, polarity-aware operators and nested
//!   captures.
//! - **Dialects**: [`SqlSettings`] implementations for SQL Server, MySQL,
//!   PostgreSQL and SQLite.
//! - **Visitors**: [`QueryVisitor`] and [`ExecuteVisitor`] walk a tree and
//!   freeze the result into a [`CommandSql`]; [`CustomVisitor`] plugins
//!   translate calls the walker does not know.
//!
//! Table metadata comes from `sqlchain-core`. Most users access this crate
//! through the `sqlchain` facade.

pub mod builder;
pub mod command;
pub mod config;
pub mod dialect;
pub mod dispatch;
pub mod expr;
pub mod visitor;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{Query, TerminalQuery, WriteQuery};
pub use command::{CommandSql, Parameters, TypedCommandSql};
pub use config::{TranslateConfig, TranslateOptions};
pub use dialect::{
    Engine, MySqlSettings, PostgresSettings, SqlServerSettings, SqlSettings, SqliteSettings,
};
pub use dispatch::{
    AggregateFunction, ArgShape, DispatchTable, ElementKind, JoinKind, Method, Operator,
    SetOperator, Signature, dispatch_table,
};
pub use expr::{BinaryOp, Call, Expr, Lambda, SqlHook, TableSource, UnaryOp, lambda, lambda2};
pub use visitor::{
    CustomVisitor, ExecuteVisitor, ExpressionWriter, QueryVisitor, StartupVisitor, VisitorState,
};
pub use writer::{Polarity, Slot, Writer};
