//! Translation configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlchain_core::{NamingConvention, Result, TableRegistry};

use crate::dialect::{Engine, SqlSettings};
use crate::visitor::CustomVisitor;

/// Settings shared by every translation run with it.
#[derive(Clone)]
pub struct TranslateConfig {
    settings: Arc<dyn SqlSettings>,
    visitors: Vec<Arc<dyn CustomVisitor>>,
    command_timeout: Option<u32>,
}

impl fmt::Debug for TranslateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslateConfig")
            .field("engine", &self.settings.engine())
            .field("visitors", &self.visitors.len())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self::for_engine(Engine::default())
    }
}

impl TranslateConfig {
    /// Create a configuration for custom dialect settings.
    pub fn new(settings: Arc<dyn SqlSettings>) -> Self {
        Self {
            settings,
            visitors: Vec::new(),
            command_timeout: None,
        }
    }

    /// Create a configuration for a built-in engine.
    pub fn for_engine(engine: Engine) -> Self {
        Self::new(engine.settings())
    }

    /// Register a custom visitor. Visitors are consulted in registration
    /// order.
    pub fn with_visitor(mut self, visitor: impl CustomVisitor + 'static) -> Self {
        self.visitors.push(Arc::new(visitor));
        self
    }

    /// Set the default command timeout in seconds.
    ///
    /// A `TimeOut` operator in the chain takes precedence.
    pub fn command_timeout(mut self, secs: u32) -> Self {
        self.command_timeout = Some(secs);
        self
    }

    /// Dialect settings.
    pub fn settings(&self) -> &Arc<dyn SqlSettings> {
        &self.settings
    }

    /// Registered custom visitors.
    pub fn visitors(&self) -> &[Arc<dyn CustomVisitor>] {
        &self.visitors
    }

    /// Default command timeout.
    pub fn default_timeout(&self) -> Option<u32> {
        self.command_timeout
    }
}

/// File-friendly translation options.
///
/// ```
/// use sqlchain_query::{Engine, TranslateOptions};
///
/// let options = TranslateOptions::from_json(r#"{"engine": "mssql", "command_timeout": 30}"#).unwrap();
/// assert_eq!(options.engine, Engine::SqlServer);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateOptions {
    /// Target engine
    pub engine: Engine,
    /// Naming convention for unannotated tables and columns
    pub naming: NamingConvention,
    /// Default command timeout in seconds
    pub command_timeout: Option<u32>,
}

impl TranslateOptions {
    /// Parse options from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the translation configuration.
    pub fn to_config(&self) -> TranslateConfig {
        let config = TranslateConfig::for_engine(self.engine);
        match self.command_timeout {
            Some(secs) => config.command_timeout(secs),
            None => config,
        }
    }

    /// Build an isolated metadata registry using the configured naming
    /// convention.
    pub fn registry(&self) -> TableRegistry {
        TableRegistry::new(self.naming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = TranslateOptions::from_json("{}").unwrap();
        assert_eq!(options.engine, Engine::PostgreSql);
        assert_eq!(options.naming, NamingConvention::SnakeCase);
        assert_eq!(options.command_timeout, None);
    }

    #[test]
    fn test_options_into_config() {
        let options =
            TranslateOptions::from_json(r#"{"engine": "sqlite", "naming": "as_is", "command_timeout": 15}"#)
                .unwrap();
        let config = options.to_config();
        assert_eq!(config.settings().engine(), Engine::Sqlite);
        assert_eq!(config.default_timeout(), Some(15));
        assert_eq!(options.registry().convention(), NamingConvention::AsIs);
    }

    #[test]
    fn test_options_reject_unknown_engine() {
        let err = TranslateOptions::from_json(r#"{"engine": "oracle"}"#).unwrap_err();
        assert!(matches!(err, sqlchain_core::Error::Serde(_)));
    }

    #[test]
    fn test_config_builder() {
        let config = TranslateConfig::for_engine(Engine::MySql).command_timeout(5);
        assert_eq!(config.settings().engine(), Engine::MySql);
        assert_eq!(config.default_timeout(), Some(5));
        assert!(config.visitors().is_empty());
    }
}
