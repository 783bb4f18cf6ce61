//! Entity trait for struct-to-table mapping.
//!
//! The `Entity` trait describes how a struct maps to a database table. It
//! is typically derived using `#[derive(Entity)]` from `sqlchain-macros`;
//! the table metadata resolver turns the static description into a cached
//! [`TableInfo`](crate::TableInfo).

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// How a concurrency-token column is compared and refreshed on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    /// Integer version: compared for equality, incremented on every update.
    Version,
    /// Timestamp: compared for equality, refreshed to `CURRENT_TIMESTAMP`.
    Timestamp,
}

impl TokenPolicy {
    /// Parse a policy from its annotation spelling (case-insensitive).
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "version" | "rowversion" => Some(TokenPolicy::Version),
            "timestamp" => Some(TokenPolicy::Timestamp),
            _ => None,
        }
    }
}

/// Metadata about a mapped struct member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Explicit column name (`#[entity(column = "...")]`)
    pub column: Option<&'static str>,
    /// Part of the primary key
    pub key: bool,
    /// Never written by INSERT/UPDATE (identity or computed columns)
    pub read_only: bool,
    /// Concurrency token policy, when this member is a token
    pub token: Option<TokenPolicy>,
}

impl FieldInfo {
    /// Create a plain writable field.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            key: false,
            read_only: false,
            token: None,
        }
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column = Some(name);
        self
    }

    /// Set the database column name from optional.
    pub const fn column_opt(mut self, name: Option<&'static str>) -> Self {
        self.column = name;
        self
    }

    /// Set key flag.
    pub const fn key(mut self, value: bool) -> Self {
        self.key = value;
        self
    }

    /// Set read-only flag.
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Mark this field as a concurrency token.
    pub const fn token(mut self, policy: TokenPolicy) -> Self {
        self.token = Some(policy);
        self
    }

    /// Set token policy from optional.
    pub const fn token_opt(mut self, policy: Option<TokenPolicy>) -> Self {
        self.token = policy;
        self
    }
}

/// Trait for structs that map to database tables.
///
/// # Example
///
/// ```ignore
/// use sqlchain::Entity;
///
/// #[derive(Entity)]
/// #[entity(table = "users")]
/// struct User {
///     #[entity(key, read_only)]
///     id: i64,
///     #[entity(column = "user_name")]
///     name: String,
///     #[entity(token = "version")]
///     version: i32,
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    /// The Rust type name, used for the naming-convention fallback.
    const TYPE_NAME: &'static str;

    /// Explicit table name, when annotated.
    const TABLE_NAME: Option<&'static str> = None;

    /// Mapped member metadata in declaration order.
    fn fields() -> &'static [FieldInfo];

    /// Member values of this instance, keyed by member name.
    fn to_row(&self) -> Vec<(&'static str, Value)>;
}
