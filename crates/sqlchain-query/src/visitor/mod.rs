//! Translation visitors.
//!
//! A visitor walks one operator-chain tree and produces a command:
//!
//! - [`QueryVisitor`] for reads, carrying the read policy of the chain
//! - [`ExecuteVisitor`] for `Insert`/`Update`/`Delete` trees
//! - [`CustomVisitor`] plugins for calls the walker does not translate itself
//!
//! Each visitor instance handles exactly one tree and moves through
//! [`VisitorState`]: `Idle` → `Started` → `Completed`, or `Faulted` once an
//! unsupported construct was met.

mod execute;
mod expression;
mod query;
pub mod select;
mod walker;

use std::fmt;

use sqlchain_core::{Error, Result};

use crate::expr::{Call, Expr};
use crate::writer::Writer;

pub use execute::ExecuteVisitor;
pub use expression::ExpressionWriter;
pub use query::QueryVisitor;

/// Lifecycle of a visitor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitorState {
    /// Created, no tree seen yet.
    #[default]
    Idle,
    /// A tree was translated; the result can be frozen.
    Started,
    /// The result was frozen and can be read repeatedly.
    Completed,
    /// Translation failed; the visitor is unusable.
    Faulted,
}

impl fmt::Display for VisitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisitorState::Idle => "idle",
            VisitorState::Started => "started",
            VisitorState::Completed => "completed",
            VisitorState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Entry point shared by the read and write visitors.
pub trait StartupVisitor {
    /// Translate `tree`. Only valid on an idle visitor.
    fn startup(&mut self, tree: &Expr) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> VisitorState;
}

/// Translation plugin for expression-level calls.
///
/// Registered visitors are consulted in order for every call inside a
/// lambda body that the walker has no built-in translation for. The first
/// one whose [`can_resolve`](CustomVisitor::can_resolve) returns `true`
/// emits the SQL.
///
/// ```
/// use sqlchain_core::Result;
/// use sqlchain_query::{Call, CustomVisitor, ExpressionWriter, Writer};
///
/// struct Soundex;
///
/// impl CustomVisitor for Soundex {
///     fn can_resolve(&self, call: &Call) -> bool {
///         call.name == "Soundex"
///     }
///
///     fn visit(&self, expressions: &ExpressionWriter<'_>, w: &mut Writer, call: &Call) -> Result<()> {
///         w.keyword("SOUNDEX(");
///         expressions.write(w, &call.args[0])?;
///         w.close_brace();
///         Ok(())
///     }
/// }
/// ```
pub trait CustomVisitor: Send + Sync {
    /// Check if this visitor translates `call`.
    fn can_resolve(&self, call: &Call) -> bool;

    /// Emit SQL for `call`. Arguments are translated through `expressions`
    /// so lambda parameters and parameters resolve as usual.
    fn visit(&self, expressions: &ExpressionWriter<'_>, w: &mut Writer, call: &Call) -> Result<()>;
}

/// Move an idle visitor to `Started`.
fn begin(state: &mut VisitorState) -> Result<()> {
    match *state {
        VisitorState::Idle => {
            *state = VisitorState::Started;
            Ok(())
        }
        other => Err(Error::InvalidState(format!(
            "startup called on a {other} visitor; create a new visitor per tree"
        ))),
    }
}

/// Check that a visitor can freeze its result.
fn ready(state: VisitorState) -> Result<()> {
    match state {
        VisitorState::Started | VisitorState::Completed => Ok(()),
        other => Err(Error::InvalidState(format!(
            "to_sql called on a {other} visitor"
        ))),
    }
}
