//! sqlchain - compile declarative query operator chains into SQL.
//!
//! A query is written as a chain of operators over an entity table and
//! translated into one parameterized statement for SQL Server, MySQL,
//! PostgreSQL or SQLite:
//!
//! - Struct-to-table mapping with `#[derive(Entity)]`
//! - Fluent chain building with [`Query`]
//! - Reads through [`QueryVisitor`], writes through [`ExecuteVisitor`]
//! - Plugin translations with [`CustomVisitor`]
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlchain::prelude::*;
//!
//! #[derive(Entity)]
//! #[entity(table = "users")]
//! struct User {
//!     #[entity(key)]
//!     id: i64,
//!     name: String,
//!     age: i32,
//! }
//!
//! let config = TranslateConfig::for_engine(Engine::SqlServer);
//! let command = Query::<User>::new()
//!     .filter(lambda("u", |u| u.member("age").ge(18)))
//!     .order_by(lambda("u", |u| u.member("name")))
//!     .take(10)
//!     .to_query_sql::<Value>(&config)?;
//!
//! // SELECT ... FROM [users] AS [u] WHERE [u].[age] >= 18
//! //   ORDER BY [u].[name] OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY
//! println!("{}", command.sql);
//! ```
//!
//! The compiler performs no I/O: executing the command, enforcing
//! `required` and applying `command_timeout` belong to the caller.

pub use sqlchain_core::{
    Entity, Error, FieldInfo, MappingError, NamingConvention, Result, TableInfo, TableRegistry,
    TokenPolicy, TypeError, UnsupportedError, Value,
};
pub use sqlchain_macros::Entity;
pub use sqlchain_query::{
    AggregateFunction, BinaryOp, Call, CommandSql, CustomVisitor, DispatchTable, Engine,
    ExecuteVisitor, Expr, ExpressionWriter, Lambda, MySqlSettings, Operator, Parameters, Polarity,
    PostgresSettings, Query, QueryVisitor, SqlHook, SqlServerSettings, SqlSettings, SqliteSettings,
    StartupVisitor, TerminalQuery, TranslateConfig, TranslateOptions, TypedCommandSql, UnaryOp,
    VisitorState, WriteQuery, Writer, dispatch_table, lambda, lambda2,
};

/// Translate any tree, reads and writes alike.
///
/// Trees rooted at `Insert`, `Update` or `Delete` go through an
/// [`ExecuteVisitor`]; everything else through a [`QueryVisitor`], whose
/// read policy is dropped.
pub fn translate(tree: &Expr, config: &TranslateConfig) -> Result<CommandSql> {
    let is_write = matches!(tree, Expr::Call(call) if call.op.is_some_and(Operator::is_write));
    tracing::debug!(is_write, "Translating tree");
    if is_write {
        ExecuteVisitor::translate(tree, config)
    } else {
        QueryVisitor::translate::<Value>(tree, config).map(TypedCommandSql::into_command)
    }
}

/// Serialize a command for logging or transport.
pub fn command_json(command: &CommandSql) -> Result<String> {
    Ok(serde_json::to_string(command)?)
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlchain::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CommandSql, CustomVisitor, Engine, Entity, Error, ExecuteVisitor, Expr, Query,
        QueryVisitor, Result, StartupVisitor, TranslateConfig, TranslateOptions, TypedCommandSql,
        Value, VisitorState, lambda, lambda2,
    };
}
