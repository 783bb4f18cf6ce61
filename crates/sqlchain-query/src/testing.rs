//! Entity fixtures shared by unit tests.

use std::sync::OnceLock;

use sqlchain_core::{Entity, FieldInfo, NamingConvention, TableRegistry, TokenPolicy, Value};

/// `users`: key `id`, `name` stored as `user_name`, version token.
#[derive(Debug, Clone)]
pub(crate) struct User {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub version: i32,
}

impl Entity for User {
    const TYPE_NAME: &'static str = "User";
    const TABLE_NAME: Option<&'static str> = Some("users");

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id").key(true),
            FieldInfo::new("name").column("user_name"),
            FieldInfo::new("age"),
            FieldInfo::new("version").token(TokenPolicy::Version),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("name", Value::from(self.name.clone())),
            ("age", Value::from(self.age)),
            ("version", Value::from(self.version)),
        ]
    }
}

/// `orders`: key `id`, read-only `created_at`.
#[derive(Debug, Clone)]
pub(crate) struct Order {
    pub id: i64,
    pub user_id: i64,
    pub total: f64,
    pub created_at: Option<String>,
}

impl Entity for Order {
    const TYPE_NAME: &'static str = "Order";
    const TABLE_NAME: Option<&'static str> = Some("orders");

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id").key(true),
            FieldInfo::new("user_id"),
            FieldInfo::new("total"),
            FieldInfo::new("created_at").read_only(true),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("user_id", Value::from(self.user_id)),
            ("total", Value::from(self.total)),
            ("created_at", Value::from(self.created_at.clone())),
        ]
    }
}

/// `ledgers`: key `id`, database-maintained timestamp token `stamp`.
#[derive(Debug, Clone)]
pub(crate) struct Ledger {
    pub id: i64,
    pub amount: f64,
    pub stamp: Option<String>,
}

impl Entity for Ledger {
    const TYPE_NAME: &'static str = "Ledger";
    const TABLE_NAME: Option<&'static str> = Some("ledgers");

    fn fields() -> &'static [FieldInfo] {
        const FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id").key(true),
            FieldInfo::new("amount"),
            FieldInfo::new("stamp")
                .token(TokenPolicy::Timestamp)
                .read_only(true),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::from(self.id)),
            ("amount", Value::from(self.amount)),
            ("stamp", Value::from(self.stamp.clone())),
        ]
    }
}

/// Registry isolated from the global one.
pub(crate) fn registry() -> &'static TableRegistry {
    static REGISTRY: OnceLock<TableRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| TableRegistry::new(NamingConvention::SnakeCase))
}
