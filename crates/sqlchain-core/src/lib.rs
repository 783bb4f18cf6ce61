//! Core types and traits for sqlchain.
//!
//! This crate provides the foundations shared by the query compiler:
//!
//! - `Value` for constants and bound parameters
//! - `Entity` trait describing how a struct maps to a table
//! - `TableRegistry` resolving and caching per-type `TableInfo`
//! - identifier quoting and splitting helpers
//! - the crate-wide `Error` and `Result`

pub mod entity;
pub mod error;
pub mod identifiers;
pub mod metadata;
pub mod value;

pub use entity::{Entity, FieldInfo, TokenPolicy};
pub use error::{Error, MappingError, Result, TypeError, UnsupportedError};
pub use identifiers::{quote_ident, quote_ident_bracket, quote_ident_mysql, split_identifier};
pub use metadata::{NamingConvention, TableInfo, TableRegistry};
pub use value::Value;
