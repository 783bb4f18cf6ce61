//! Dialect settings consumed by the SQL writer.
//!
//! A [`SqlSettings`] implementation supplies everything the writer cannot
//! decide on its own: identifier quoting, parameter naming, boolean literals,
//! string functions and the pagination rewrite. Four engines are built in.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlchain_core::{quote_ident, quote_ident_bracket, quote_ident_mysql};

/// Target database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Microsoft SQL Server
    #[serde(alias = "mssql")]
    SqlServer,
    /// MySQL / MariaDB
    MySql,
    /// PostgreSQL
    #[default]
    #[serde(alias = "postgres")]
    PostgreSql,
    /// SQLite
    Sqlite,
}

impl Engine {
    /// Built-in settings for this engine.
    pub fn settings(self) -> Arc<dyn SqlSettings> {
        match self {
            Engine::SqlServer => Arc::new(SqlServerSettings),
            Engine::MySql => Arc::new(MySqlSettings),
            Engine::PostgreSql => Arc::new(PostgresSettings),
            Engine::Sqlite => Arc::new(SqliteSettings),
        }
    }

    /// Lowercase engine name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Engine::SqlServer => "sqlserver",
            Engine::MySql => "mysql",
            Engine::PostgreSql => "postgresql",
            Engine::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dialect contract.
///
/// Function helpers receive already-rendered SQL fragments and return the
/// composed fragment. `substring` receives a 1-based start position.
pub trait SqlSettings: fmt::Debug + Send + Sync {
    /// Engine tag, for per-engine branches in the execution layer.
    fn engine(&self) -> Engine;

    /// Opening identifier quote.
    fn open_brace(&self) -> &'static str;

    /// Closing identifier quote.
    fn close_brace(&self) -> &'static str;

    /// Quote a single identifier component.
    fn name(&self, ident: &str) -> String {
        let close = self.close_brace();
        format!(
            "{}{}{}",
            self.open_brace(),
            ident.replace(close, &close.repeat(2)),
            close
        )
    }

    /// Placeholder text for a bound parameter name.
    fn parameter_name(&self, name: &str) -> String;

    /// Inline boolean literal.
    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    /// NULL literal.
    fn null_literal(&self) -> &'static str {
        "NULL"
    }

    /// Character length of `expr`.
    fn length(&self, expr: &str) -> String {
        format!("LENGTH({expr})")
    }

    /// 0-based position of `needle` in `haystack`, -1 when absent.
    fn index_of(&self, haystack: &str, needle: &str) -> String;

    /// Substring of `expr` from 1-based `start`, optionally `len` characters.
    fn substring(&self, expr: &str, start: &str, len: Option<&str>) -> String {
        match len {
            Some(len) => format!("SUBSTRING({expr}, {start}, {len})"),
            None => format!("SUBSTRING({expr}, {start})"),
        }
    }

    /// String concatenation.
    fn concat(&self, parts: &[String]) -> String {
        parts.join(" || ")
    }

    /// Rewrite `sql` into a paged statement.
    ///
    /// `order_by` is the collected ORDER BY text without the keyword, empty
    /// when the query is unordered.
    fn to_sql(&self, sql: &str, take: Option<u64>, skip: u64, order_by: &str) -> String;
}

fn with_order(sql: &str, order_by: &str) -> String {
    if order_by.is_empty() {
        sql.to_string()
    } else {
        format!("{sql} ORDER BY {order_by}")
    }
}

// ==================== SQL Server ====================

/// SQL Server: `[name]`, `@p`, `OFFSET .. FETCH` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerSettings;

impl SqlSettings for SqlServerSettings {
    fn engine(&self) -> Engine {
        Engine::SqlServer
    }

    fn open_brace(&self) -> &'static str {
        "["
    }

    fn close_brace(&self) -> &'static str {
        "]"
    }

    fn name(&self, ident: &str) -> String {
        quote_ident_bracket(ident)
    }

    fn parameter_name(&self, name: &str) -> String {
        format!("@{name}")
    }

    fn length(&self, expr: &str) -> String {
        format!("LEN({expr})")
    }

    fn index_of(&self, haystack: &str, needle: &str) -> String {
        format!("(CHARINDEX({needle}, {haystack}) - 1)")
    }

    fn substring(&self, expr: &str, start: &str, len: Option<&str>) -> String {
        // SUBSTRING requires a length on SQL Server
        let len = len.map_or_else(|| self.length(expr), str::to_string);
        format!("SUBSTRING({expr}, {start}, {len})")
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn to_sql(&self, sql: &str, take: Option<u64>, skip: u64, order_by: &str) -> String {
        if order_by.is_empty() && skip == 0 {
            if let Some(take) = take {
                // TOP goes right after SELECT [DISTINCT]
                for head in ["SELECT DISTINCT ", "SELECT "] {
                    if let Some(rest) = sql.strip_prefix(head) {
                        return format!("{head}TOP ({take}) {rest}");
                    }
                }
            }
        }

        let order_by = if order_by.is_empty() {
            "(SELECT NULL)"
        } else {
            order_by
        };
        let mut out = format!("{sql} ORDER BY {order_by} OFFSET {skip} ROWS");
        if let Some(take) = take {
            out.push_str(&format!(" FETCH NEXT {take} ROWS ONLY"));
        }
        out
    }
}

// ==================== MySQL ====================

/// MySQL: `` `name` ``, `?p`, `LIMIT skip, take` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlSettings;

impl SqlSettings for MySqlSettings {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn open_brace(&self) -> &'static str {
        "`"
    }

    fn close_brace(&self) -> &'static str {
        "`"
    }

    fn name(&self, ident: &str) -> String {
        quote_ident_mysql(ident)
    }

    fn parameter_name(&self, name: &str) -> String {
        format!("?{name}")
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn length(&self, expr: &str) -> String {
        format!("CHAR_LENGTH({expr})")
    }

    fn index_of(&self, haystack: &str, needle: &str) -> String {
        format!("(LOCATE({needle}, {haystack}) - 1)")
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn to_sql(&self, sql: &str, take: Option<u64>, skip: u64, order_by: &str) -> String {
        let sql = with_order(sql, order_by);
        match (take, skip) {
            (Some(take), 0) => format!("{sql} LIMIT {take}"),
            (Some(take), skip) => format!("{sql} LIMIT {skip}, {take}"),
            // MySQL has no OFFSET without LIMIT
            (None, skip) => format!("{sql} LIMIT {skip}, 18446744073709551615"),
        }
    }
}

// ==================== PostgreSQL ====================

/// PostgreSQL: `"name"`, `:p`, `LIMIT .. OFFSET` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSettings;

impl SqlSettings for PostgresSettings {
    fn engine(&self) -> Engine {
        Engine::PostgreSql
    }

    fn open_brace(&self) -> &'static str {
        "\""
    }

    fn close_brace(&self) -> &'static str {
        "\""
    }

    fn name(&self, ident: &str) -> String {
        quote_ident(ident)
    }

    fn parameter_name(&self, name: &str) -> String {
        format!(":{name}")
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn index_of(&self, haystack: &str, needle: &str) -> String {
        format!("(STRPOS({haystack}, {needle}) - 1)")
    }

    fn substring(&self, expr: &str, start: &str, len: Option<&str>) -> String {
        match len {
            Some(len) => format!("SUBSTRING({expr} FROM {start} FOR {len})"),
            None => format!("SUBSTRING({expr} FROM {start})"),
        }
    }

    fn to_sql(&self, sql: &str, take: Option<u64>, skip: u64, order_by: &str) -> String {
        let mut out = with_order(sql, order_by);
        if let Some(take) = take {
            out.push_str(&format!(" LIMIT {take}"));
        }
        if skip > 0 {
            out.push_str(&format!(" OFFSET {skip}"));
        }
        out
    }
}

// ==================== SQLite ====================

/// SQLite: `"name"`, `@p`, `LIMIT .. OFFSET` paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSettings;

impl SqlSettings for SqliteSettings {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn open_brace(&self) -> &'static str {
        "\""
    }

    fn close_brace(&self) -> &'static str {
        "\""
    }

    fn name(&self, ident: &str) -> String {
        quote_ident(ident)
    }

    fn parameter_name(&self, name: &str) -> String {
        format!("@{name}")
    }

    fn index_of(&self, haystack: &str, needle: &str) -> String {
        format!("(INSTR({haystack}, {needle}) - 1)")
    }

    fn substring(&self, expr: &str, start: &str, len: Option<&str>) -> String {
        match len {
            Some(len) => format!("SUBSTR({expr}, {start}, {len})"),
            None => format!("SUBSTR({expr}, {start})"),
        }
    }

    fn to_sql(&self, sql: &str, take: Option<u64>, skip: u64, order_by: &str) -> String {
        let sql = with_order(sql, order_by);
        // SQLite needs a LIMIT before OFFSET; -1 means unbounded
        let limit = take.map_or_else(|| "-1".to_string(), |t| t.to_string());
        if skip > 0 {
            format!("{sql} LIMIT {limit} OFFSET {skip}")
        } else {
            format!("{sql} LIMIT {limit}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Quoting Tests ====================

    #[test]
    fn test_names_per_dialect() {
        assert_eq!(SqlServerSettings.name("a]b"), "[a]]b]");
        assert_eq!(MySqlSettings.name("user"), "`user`");
        assert_eq!(PostgresSettings.name("user"), "\"user\"");
        assert_eq!(SqliteSettings.name("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_parameter_names() {
        assert_eq!(SqlServerSettings.parameter_name("p"), "@p");
        assert_eq!(MySqlSettings.parameter_name("p"), "?p");
        assert_eq!(PostgresSettings.parameter_name("p"), ":p");
        assert_eq!(SqliteSettings.parameter_name("p"), "@p");
    }

    // ==================== Paging Tests ====================

    #[test]
    fn test_sqlserver_top_without_order() {
        let sql = SqlServerSettings.to_sql("SELECT [x].[id] FROM [t] AS [x]", Some(5), 0, "");
        assert_eq!(sql, "SELECT TOP (5) [x].[id] FROM [t] AS [x]");

        let sql = SqlServerSettings.to_sql("SELECT DISTINCT [id] FROM [t]", Some(1), 0, "");
        assert_eq!(sql, "SELECT DISTINCT TOP (1) [id] FROM [t]");
    }

    #[test]
    fn test_sqlserver_offset_fetch() {
        let sql = SqlServerSettings.to_sql("SELECT [id] FROM [t]", Some(10), 20, "[id] DESC");
        assert_eq!(
            sql,
            "SELECT [id] FROM [t] ORDER BY [id] DESC OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );

        let sql = SqlServerSettings.to_sql("SELECT [id] FROM [t]", None, 3, "");
        assert_eq!(sql, "SELECT [id] FROM [t] ORDER BY (SELECT NULL) OFFSET 3 ROWS");
    }

    #[test]
    fn test_mysql_limit() {
        assert_eq!(
            MySqlSettings.to_sql("SELECT 1", Some(10), 0, "`id`"),
            "SELECT 1 ORDER BY `id` LIMIT 10"
        );
        assert_eq!(
            MySqlSettings.to_sql("SELECT 1", Some(10), 5, ""),
            "SELECT 1 LIMIT 5, 10"
        );
    }

    #[test]
    fn test_postgres_and_sqlite_limit_offset() {
        assert_eq!(
            PostgresSettings.to_sql("SELECT 1", Some(10), 5, "\"id\""),
            "SELECT 1 ORDER BY \"id\" LIMIT 10 OFFSET 5"
        );
        assert_eq!(
            PostgresSettings.to_sql("SELECT 1", None, 5, ""),
            "SELECT 1 OFFSET 5"
        );
        assert_eq!(
            SqliteSettings.to_sql("SELECT 1", None, 5, ""),
            "SELECT 1 LIMIT -1 OFFSET 5"
        );
    }

    // ==================== Function Tests ====================

    #[test]
    fn test_string_functions() {
        assert_eq!(SqlServerSettings.length("[n]"), "LEN([n])");
        assert_eq!(
            SqlServerSettings.substring("[n]", "2", None),
            "SUBSTRING([n], 2, LEN([n]))"
        );
        assert_eq!(
            PostgresSettings.index_of("\"n\"", ":p"),
            "(STRPOS(\"n\", :p) - 1)"
        );
        assert_eq!(
            MySqlSettings.concat(&["a".to_string(), "b".to_string()]),
            "CONCAT(a, b)"
        );
        assert_eq!(
            SqliteSettings.concat(&["a".to_string(), "b".to_string()]),
            "a || b"
        );
    }

    #[test]
    fn test_engine_deserialize_and_settings() {
        let engine: Engine = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(engine, Engine::PostgreSql);
        let engine: Engine = serde_json::from_str("\"sqlserver\"").unwrap();
        assert_eq!(engine.settings().engine(), Engine::SqlServer);
        assert_eq!(Engine::Sqlite.to_string(), "sqlite");
    }
}
