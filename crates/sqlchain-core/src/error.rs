//! Error types for query translation.

use std::fmt;

/// The primary error type for all translation operations.
#[derive(Debug)]
pub enum Error {
    /// An operator or expression shape the compiler cannot translate.
    Unsupported(UnsupportedError),
    /// The operator dispatch table is malformed (ambiguous signatures).
    Dispatch(String),
    /// An argument was rejected (negative page size, non-writable member, ...).
    Argument(String),
    /// A member could not be mapped to a column of its entity.
    Mapping(MappingError),
    /// The visitor protocol was used out of order.
    InvalidState(String),
    /// Value conversion errors
    Type(TypeError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// An unsupported construct met during translation.
#[derive(Debug, Clone)]
pub struct UnsupportedError {
    /// Operator or method name, when the construct was a call.
    pub operator: Option<String>,
    /// Human-readable explanation.
    pub message: String,
}

/// A member that has no column on the entity it was accessed through.
#[derive(Debug, Clone)]
pub struct MappingError {
    pub table: String,
    pub member: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub rust_type: Option<&'static str>,
}

impl Error {
    /// Shorthand for an unsupported operator call.
    pub fn unsupported_operator(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Unsupported(UnsupportedError {
            operator: Some(name.into()),
            message: message.into(),
        })
    }

    /// Shorthand for an unsupported expression shape.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(UnsupportedError {
            operator: None,
            message: message.into(),
        })
    }

    /// Shorthand for an unmapped member.
    pub fn unmapped(table: impl Into<String>, member: impl Into<String>) -> Self {
        Error::Mapping(MappingError {
            table: table.into(),
            member: member.into(),
        })
    }

    /// Is this a fatal translation failure?
    ///
    /// Every error is fatal for the translation that raised it; this only
    /// distinguishes constructs the walker cannot express from caller misuse.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }

    /// Operator name attached to the error, if any.
    pub fn operator(&self) -> Option<&str> {
        match self {
            Error::Unsupported(e) => e.operator.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unsupported(e) => write!(f, "Unsupported construct: {}", e),
            Error::Dispatch(msg) => write!(f, "Dispatch table error: {}", msg),
            Error::Argument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Mapping(e) => write!(f, "Mapping error: {}", e),
            Error::InvalidState(msg) => write!(f, "Invalid visitor state: {}", msg),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for UnsupportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operator {
            Some(op) => write!(f, "{} ({})", self.message, op),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "member '{}' is not mapped to a column of '{}'",
            self.member, self.table
        )
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rust_type {
            Some(ty) => write!(
                f,
                "expected {}, found {} (converting to {})",
                self.expected, self.actual, ty
            ),
            None => write!(f, "expected {}, found {}", self.expected, self.actual),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

/// Result type alias for translation operations.
pub type Result<T> = std::result::Result<T, Error>;
