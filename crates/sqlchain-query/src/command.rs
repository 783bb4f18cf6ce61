//! Translation output.

use std::ops::Deref;

use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlchain_core::Value;

/// Bound parameters in binding order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters(Vec<(String, Value)>);

impl Parameters {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value bound under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Check if a parameter named `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no parameter is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(name, value)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Parameter names in binding order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub(crate) fn push(&mut self, name: String, value: Value) {
        self.0.push((name, value));
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a (String, Value);
    type IntoIter = std::slice::Iter<'a, (String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// SQL text with its bound parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CommandSql {
    /// Statement text.
    pub sql: String,
    /// Bound parameters.
    pub parameters: Parameters,
    /// Command timeout in seconds, applied by the execution layer.
    pub command_timeout: Option<u32>,
}

impl CommandSql {
    /// Create a command without a timeout.
    pub fn new(sql: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            sql: sql.into(),
            parameters,
            command_timeout: None,
        }
    }
}

/// A read command with its result policy.
///
/// A required read that yields no row is an error the execution layer
/// raises with [`missing_data_message`](Self::missing_data_message); the
/// compiler only records the policy.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TypedCommandSql<T> {
    /// Statement, parameters and timeout.
    #[serde(flatten)]
    pub command: CommandSql,
    /// At least one row must be returned.
    pub required: bool,
    /// `default_value` is meaningful.
    pub has_default_value: bool,
    /// Fallback for `*OrDefault` reads.
    pub default_value: Option<T>,
    /// Message for a required read that found no row.
    pub missing_data_message: Option<String>,
}

impl<T> TypedCommandSql<T> {
    /// Drop the result policy.
    pub fn into_command(self) -> CommandSql {
        self.command
    }
}

impl<T> Deref for TypedCommandSql<T> {
    type Target = CommandSql;

    fn deref(&self) -> &CommandSql {
        &self.command
    }
}
