//! Table metadata resolution.
//!
//! [`TableRegistry`] turns the static [`Entity`] description of a type into
//! a [`TableInfo`] the first time that type is resolved, and hands out the
//! same `Arc<TableInfo>` on every later call. Entity shape is fixed for the
//! lifetime of the process, so entries are never invalidated.
//!
//! A process-wide registry is available through [`TableRegistry::global`];
//! tests and embedders that need isolation construct their own with
//! [`TableRegistry::new`].

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, TokenPolicy};

/// Naming transform applied to type and member names without an explicit
/// table or column annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// Use names verbatim.
    AsIs,
    /// `UserAccount` -> `user_account`
    #[default]
    SnakeCase,
    /// `user_account` -> `UserAccount`
    PascalCase,
    /// `user_account` -> `userAccount`
    CamelCase,
}

impl NamingConvention {
    /// Apply this convention to a name.
    pub fn apply(self, name: &str) -> String {
        match self {
            NamingConvention::AsIs => name.to_string(),
            NamingConvention::SnakeCase => to_snake_case(name),
            NamingConvention::PascalCase => to_pascal_case(name),
            NamingConvention::CamelCase => {
                let pascal = to_pascal_case(name);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_lowercase().chain(chars).collect(),
                    None => pascal,
                }
            }
        }
    }
}

/// Convert PascalCase to snake_case.
///
/// - `Hero` -> `hero`
/// - `TeamMember` -> `team_member`
/// - `HTTPServer` -> `http_server`
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next = chars.get(i + 1).copied();
                let should_underscore = prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next.is_some_and(|n| n.is_lowercase()));
                if should_underscore {
                    result.push('_');
                }
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Convert snake_case (or already Pascal) names to PascalCase.
fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Resolved table metadata for one entity type.
///
/// Member lists keep declaration order so generated column lists are
/// stable. `read_writes` excludes keys and read-only members;
/// `read_or_writes` holds every mapped member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// `TypeId` of the entity.
    pub table_type: TypeId,
    /// Rust type name of the entity.
    pub type_name: &'static str,
    /// Table name.
    pub table_name: String,
    /// Key members.
    pub keys: Vec<String>,
    /// Read-only members.
    pub read_onlys: Vec<String>,
    /// Concurrency-token members with their policy.
    pub tokens: Vec<(String, TokenPolicy)>,
    /// Member -> column for members an UPDATE may assign.
    pub read_writes: Vec<(String, String)>,
    /// Every mapped member -> column.
    pub read_or_writes: Vec<(String, String)>,
}

impl TableInfo {
    /// Build metadata for `T` under a naming convention.
    pub fn build<T: Entity>(convention: NamingConvention) -> Self {
        let table_name = T::TABLE_NAME.map_or_else(
            || convention.apply(T::TYPE_NAME),
            std::string::ToString::to_string,
        );

        let mut info = TableInfo {
            table_type: TypeId::of::<T>(),
            type_name: T::TYPE_NAME,
            table_name,
            keys: Vec::new(),
            read_onlys: Vec::new(),
            tokens: Vec::new(),
            read_writes: Vec::new(),
            read_or_writes: Vec::new(),
        };

        for field in T::fields() {
            let member = field.name.to_string();
            let column = field
                .column
                .map_or_else(|| convention.apply(field.name), str::to_string);

            if field.key {
                info.keys.push(member.clone());
            }
            if let Some(policy) = field.token {
                info.tokens.push((member.clone(), policy));
            }
            if field.read_only {
                info.read_onlys.push(member.clone());
            } else if !field.key {
                info.read_writes.push((member.clone(), column.clone()));
            }
            info.read_or_writes.push((member, column));
        }

        info
    }

    /// Column mapped to `member`.
    pub fn column(&self, member: &str) -> Option<&str> {
        self.read_or_writes
            .iter()
            .find(|(m, _)| m == member)
            .map(|(_, c)| c.as_str())
    }

    /// Is `member` part of the key?
    pub fn is_key(&self, member: &str) -> bool {
        self.keys.iter().any(|k| k == member)
    }

    /// Is `member` read-only?
    pub fn is_read_only(&self, member: &str) -> bool {
        self.read_onlys.iter().any(|k| k == member)
    }

    /// Is `member` assignable by UPDATE?
    pub fn is_writable(&self, member: &str) -> bool {
        self.read_writes.iter().any(|(m, _)| m == member)
    }

    /// Token policy of `member`, if it is a concurrency token.
    pub fn token(&self, member: &str) -> Option<TokenPolicy> {
        self.tokens
            .iter()
            .find(|(m, _)| m == member)
            .map(|(_, p)| *p)
    }

    /// `(member, column)` pairs of the key, in declaration order.
    pub fn key_columns(&self) -> Vec<(&str, &str)> {
        self.read_or_writes
            .iter()
            .filter(|(m, _)| self.is_key(m))
            .map(|(m, c)| (m.as_str(), c.as_str()))
            .collect()
    }

    /// `(member, column)` pairs assigned by UPDATE.
    pub fn writable_columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.read_writes
            .iter()
            .map(|(m, c)| (m.as_str(), c.as_str()))
    }

    /// `(member, column)` pairs written by INSERT: writable members plus
    /// keys that are not read-only.
    pub fn insertable_columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.read_or_writes
            .iter()
            .filter(|(m, _)| !self.is_read_only(m))
            .map(|(m, c)| (m.as_str(), c.as_str()))
    }
}

/// Read-through cache of [`TableInfo`] keyed by entity type.
#[derive(Debug, Default)]
pub struct TableRegistry {
    convention: NamingConvention,
    cache: RwLock<HashMap<TypeId, Arc<TableInfo>>>,
}

impl TableRegistry {
    /// Create an empty registry using `convention` for unannotated names.
    pub fn new(convention: NamingConvention) -> Self {
        Self {
            convention,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry (snake_case convention).
    pub fn global() -> &'static TableRegistry {
        static REGISTRY: OnceLock<TableRegistry> = OnceLock::new();
        REGISTRY.get_or_init(TableRegistry::default)
    }

    /// Naming convention of this registry.
    pub fn convention(&self) -> NamingConvention {
        self.convention
    }

    /// Resolve metadata for `T`, building it on first use.
    ///
    /// Concurrent first resolutions of the same type may both build, but
    /// only the first insert is kept and every caller receives that entry.
    pub fn resolve<T: Entity>(&self) -> Arc<TableInfo> {
        let key = TypeId::of::<T>();

        // Fast path: already cached
        // Use unwrap_or_else to recover from poisoned lock (another thread panicked)
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(info) = cache.get(&key) {
                return Arc::clone(info);
            }
        }

        let built = Arc::new(TableInfo::build::<T>(self.convention));
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let entry = cache.entry(key).or_insert_with(|| {
            tracing::debug!(
                entity = T::TYPE_NAME,
                table = %built.table_name,
                columns = built.read_or_writes.len(),
                "Resolved table metadata"
            );
            Arc::clone(&built)
        });
        Arc::clone(entry)
    }

    /// Number of resolved types.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
