//! Operator dispatch table.
//!
//! Every supported chain operator is listed once with its exact argument
//! shapes. Overloads sharing a name are told apart by arity, by which
//! arguments are lambdas and by each lambda's parameter count, so the walker
//! knows which SQL construct to build before it looks at any argument.
//!
//! The table is built once per process. Two entries with the same name and
//! shapes are rejected when the table is constructed.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use sqlchain_core::{Error, Result};

use crate::expr::Expr;

/// Shape of one call argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgShape {
    /// A query source or chain.
    Query,
    /// A lambda with the given parameter count.
    Lambda(usize),
    /// Any scalar expression.
    Value,
    /// Entity instance values.
    Row,
    /// SQL capture callback.
    Hook,
}

impl ArgShape {
    /// Shape of an argument expression.
    pub fn of(expr: &Expr) -> ArgShape {
        match expr {
            Expr::Lambda(l) => ArgShape::Lambda(l.arity()),
            Expr::Row(_) => ArgShape::Row,
            Expr::Hook(_) => ArgShape::Hook,
            e if e.is_query() => ArgShape::Query,
            _ => ArgShape::Value,
        }
    }
}

impl fmt::Display for ArgShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgShape::Query => f.write_str("query"),
            ArgShape::Lambda(n) => write!(f, "lambda/{n}"),
            ArgShape::Value => f.write_str("value"),
            ArgShape::Row => f.write_str("row"),
            ArgShape::Hook => f.write_str("hook"),
        }
    }
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// Set combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Concat,
    Union,
    Intersect,
    Except,
}

impl SetOperator {
    pub const fn as_sql(self) -> &'static str {
        match self {
            SetOperator::Concat => "UNION ALL",
            SetOperator::Union => "UNION",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        }
    }
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    LongCount,
    Sum,
    Average,
    Min,
    Max,
}

impl AggregateFunction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            AggregateFunction::Count | AggregateFunction::LongCount => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Average => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    /// Count-family functions take a predicate instead of a selector.
    pub const fn is_count(self) -> bool {
        matches!(self, AggregateFunction::Count | AggregateFunction::LongCount)
    }
}

/// Element access flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    First,
    Single,
    Last,
    ElementAt,
}

/// Canonical operator tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Where,
    Select,
    /// `result`: a result selector follows the collection selector.
    SelectMany {
        result: bool,
    },
    Join(JoinKind),
    OrderBy {
        descending: bool,
        then: bool,
    },
    Take,
    Skip,
    TakeWhile,
    SkipWhile,
    TakeLast,
    SkipLast,
    Reverse,
    Distinct,
    GroupBy {
        element: bool,
        result: bool,
    },
    SetOp(SetOperator),
    /// `lambda`: a selector (or predicate for the count family) is given.
    Aggregate {
        function: AggregateFunction,
        lambda: bool,
    },
    Element {
        kind: ElementKind,
        or_default: bool,
        predicate: bool,
        default: bool,
    },
    Any {
        predicate: bool,
    },
    All,
    Contains,
    Cast,
    OfType,
    DefaultIfEmpty {
        value: bool,
    },
    From,
    TimeOut,
    NoResultError,
    WatchSql,
    Insert {
        row: bool,
    },
    Update {
        row: bool,
    },
    Delete {
        row: bool,
    },
}

impl Operator {
    /// Operators whose result is not a row sequence.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Operator::Aggregate { .. }
                | Operator::Element { .. }
                | Operator::Any { .. }
                | Operator::All
                | Operator::Contains
                | Operator::Insert { .. }
                | Operator::Update { .. }
                | Operator::Delete { .. }
        )
    }

    /// Insert, update and delete.
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Operator::Insert { .. } | Operator::Update { .. } | Operator::Delete { .. }
        )
    }
}

/// Canonical call signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub name: &'static str,
    pub shapes: &'static [ArgShape],
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shapes: Vec<String> = self.shapes.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.name, shapes.join(", "))
    }
}

const Q: ArgShape = ArgShape::Query;
const V: ArgShape = ArgShape::Value;
const L1: ArgShape = ArgShape::Lambda(1);
const L2: ArgShape = ArgShape::Lambda(2);
const ROW: ArgShape = ArgShape::Row;
const HOOK: ArgShape = ArgShape::Hook;

const fn sig(name: &'static str, shapes: &'static [ArgShape]) -> Signature {
    Signature { name, shapes }
}

const fn aggregate(function: AggregateFunction, lambda: bool) -> Operator {
    Operator::Aggregate { function, lambda }
}

const fn element(kind: ElementKind, or_default: bool, predicate: bool, default: bool) -> Operator {
    Operator::Element {
        kind,
        or_default,
        predicate,
        default,
    }
}

macro_rules! element_family {
    ($name:literal, $default_name:literal, $kind:expr) => {
        [
            (sig($name, &[Q]), element($kind, false, false, false)),
            (sig($name, &[Q, L1]), element($kind, false, true, false)),
            (sig($default_name, &[Q]), element($kind, true, false, false)),
            (sig($default_name, &[Q, L1]), element($kind, true, true, false)),
            (sig($default_name, &[Q, V]), element($kind, true, false, true)),
            (sig($default_name, &[Q, L1, V]), element($kind, true, true, true)),
        ]
    };
}

macro_rules! aggregate_family {
    ($name:literal, $function:expr) => {
        [
            (sig($name, &[Q]), aggregate($function, false)),
            (sig($name, &[Q, L1]), aggregate($function, true)),
        ]
    };
}

/// Built-in operator signatures.
pub fn builtin_signatures() -> Vec<(Signature, Operator)> {
    use AggregateFunction as Agg;
    use ElementKind as El;

    let mut entries = vec![
        // Filtering and projection
        (sig("Where", &[Q, L1]), Operator::Where),
        (sig("Select", &[Q, L1]), Operator::Select),
        (
            sig("SelectMany", &[Q, L1]),
            Operator::SelectMany { result: false },
        ),
        (
            sig("SelectMany", &[Q, L1, L2]),
            Operator::SelectMany { result: true },
        ),
        // Joins
        (
            sig("Join", &[Q, Q, L1, L1, L2]),
            Operator::Join(JoinKind::Inner),
        ),
        (
            sig("GroupJoin", &[Q, Q, L1, L1, L2]),
            Operator::Join(JoinKind::LeftOuter),
        ),
        // Sorting
        (
            sig("OrderBy", &[Q, L1]),
            Operator::OrderBy {
                descending: false,
                then: false,
            },
        ),
        (
            sig("OrderByDescending", &[Q, L1]),
            Operator::OrderBy {
                descending: true,
                then: false,
            },
        ),
        (
            sig("ThenBy", &[Q, L1]),
            Operator::OrderBy {
                descending: false,
                then: true,
            },
        ),
        (
            sig("ThenByDescending", &[Q, L1]),
            Operator::OrderBy {
                descending: true,
                then: true,
            },
        ),
        // Paging
        (sig("Take", &[Q, V]), Operator::Take),
        (sig("Skip", &[Q, V]), Operator::Skip),
        (sig("TakeWhile", &[Q, L1]), Operator::TakeWhile),
        (sig("SkipWhile", &[Q, L1]), Operator::SkipWhile),
        (sig("TakeLast", &[Q, V]), Operator::TakeLast),
        (sig("SkipLast", &[Q, V]), Operator::SkipLast),
        (sig("Reverse", &[Q]), Operator::Reverse),
        (sig("Distinct", &[Q]), Operator::Distinct),
        // Grouping
        (
            sig("GroupBy", &[Q, L1]),
            Operator::GroupBy {
                element: false,
                result: false,
            },
        ),
        (
            sig("GroupBy", &[Q, L1, L1]),
            Operator::GroupBy {
                element: true,
                result: false,
            },
        ),
        (
            sig("GroupBy", &[Q, L1, L2]),
            Operator::GroupBy {
                element: false,
                result: true,
            },
        ),
        (
            sig("GroupBy", &[Q, L1, L1, L2]),
            Operator::GroupBy {
                element: true,
                result: true,
            },
        ),
        // Set combination
        (sig("Concat", &[Q, Q]), Operator::SetOp(SetOperator::Concat)),
        (sig("Union", &[Q, Q]), Operator::SetOp(SetOperator::Union)),
        (
            sig("Intersect", &[Q, Q]),
            Operator::SetOp(SetOperator::Intersect),
        ),
        (sig("Except", &[Q, Q]), Operator::SetOp(SetOperator::Except)),
        // Element access
        (sig("ElementAt", &[Q, V]), element(El::ElementAt, false, false, false)),
        (
            sig("ElementAtOrDefault", &[Q, V]),
            element(El::ElementAt, true, false, false),
        ),
        // Quantifiers
        (sig("Any", &[Q]), Operator::Any { predicate: false }),
        (sig("Any", &[Q, L1]), Operator::Any { predicate: true }),
        (sig("All", &[Q, L1]), Operator::All),
        (sig("Contains", &[Q, V]), Operator::Contains),
        // Type filters and null substitution
        (sig("Cast", &[Q]), Operator::Cast),
        (sig("OfType", &[Q]), Operator::OfType),
        (
            sig("DefaultIfEmpty", &[Q]),
            Operator::DefaultIfEmpty { value: false },
        ),
        (
            sig("DefaultIfEmpty", &[Q, V]),
            Operator::DefaultIfEmpty { value: true },
        ),
        // Repository extensions
        (sig("From", &[Q, V]), Operator::From),
        (sig("TimeOut", &[Q, V]), Operator::TimeOut),
        (sig("NoResultError", &[Q, V]), Operator::NoResultError),
        (sig("WatchSql", &[Q, HOOK]), Operator::WatchSql),
        (sig("Insert", &[Q, Q]), Operator::Insert { row: false }),
        (sig("Insert", &[Q, ROW]), Operator::Insert { row: true }),
        (sig("Update", &[Q, L1]), Operator::Update { row: false }),
        (sig("Update", &[Q, ROW]), Operator::Update { row: true }),
        (sig("Delete", &[Q]), Operator::Delete { row: false }),
        (sig("Delete", &[Q, ROW]), Operator::Delete { row: true }),
    ];

    entries.extend(aggregate_family!("Count", Agg::Count));
    entries.extend(aggregate_family!("LongCount", Agg::LongCount));
    entries.extend(aggregate_family!("Sum", Agg::Sum));
    entries.extend(aggregate_family!("Average", Agg::Average));
    entries.extend(aggregate_family!("Min", Agg::Min));
    entries.extend(aggregate_family!("Max", Agg::Max));
    entries.extend(element_family!("First", "FirstOrDefault", El::First));
    entries.extend(element_family!("Single", "SingleOrDefault", El::Single));
    entries.extend(element_family!("Last", "LastOrDefault", El::Last));

    entries
}

/// Lookup from call signature to operator tag.
#[derive(Debug)]
pub struct DispatchTable {
    entries: HashMap<&'static str, Vec<(&'static [ArgShape], Operator)>>,
    len: usize,
}

impl DispatchTable {
    /// Build a table, rejecting duplicate signatures.
    pub fn new(signatures: impl IntoIterator<Item = (Signature, Operator)>) -> Result<Self> {
        let mut entries: HashMap<&'static str, Vec<(&'static [ArgShape], Operator)>> =
            HashMap::new();
        let mut len = 0;

        for (signature, op) in signatures {
            let overloads = entries.entry(signature.name).or_default();
            if let Some((_, existing)) = overloads.iter().find(|(s, _)| *s == signature.shapes) {
                return Err(Error::Dispatch(format!(
                    "ambiguous signature {signature}: maps to both {existing:?} and {op:?}"
                )));
            }
            overloads.push((signature.shapes, op));
            len += 1;
        }

        tracing::debug!(signatures = len, "Built operator dispatch table");
        Ok(Self { entries, len })
    }

    /// The built-in table.
    pub fn builtin() -> Result<Self> {
        Self::new(builtin_signatures())
    }

    /// Resolve a call by name and argument shapes.
    pub fn lookup(&self, name: &str, shapes: &[ArgShape]) -> Option<Operator> {
        self.entries
            .get(name)?
            .iter()
            .find(|(s, _)| *s == shapes)
            .map(|(_, op)| *op)
    }

    /// Number of signatures.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The process-wide built-in table.
pub fn dispatch_table() -> &'static DispatchTable {
    static TABLE: OnceLock<DispatchTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        DispatchTable::builtin().expect("built-in operator signatures are unambiguous")
    })
}

/// Scalar and group methods recognized inside lambda bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Contains,
    StartsWith,
    EndsWith,
    Length,
    IndexOf,
    Substring,
    ToUpper,
    ToLower,
    Trim,
    IsNullOrEmpty,
    Aggregate(AggregateFunction),
}

impl Method {
    /// Resolve a method by name.
    pub fn from_name(name: &str) -> Option<Method> {
        Some(match name {
            "Contains" => Method::Contains,
            "StartsWith" => Method::StartsWith,
            "EndsWith" => Method::EndsWith,
            "Length" => Method::Length,
            "IndexOf" => Method::IndexOf,
            "Substring" => Method::Substring,
            "ToUpper" => Method::ToUpper,
            "ToLower" => Method::ToLower,
            "Trim" => Method::Trim,
            "IsNullOrEmpty" => Method::IsNullOrEmpty,
            "Count" => Method::Aggregate(AggregateFunction::Count),
            "LongCount" => Method::Aggregate(AggregateFunction::LongCount),
            "Sum" => Method::Aggregate(AggregateFunction::Sum),
            "Average" => Method::Aggregate(AggregateFunction::Average),
            "Min" => Method::Aggregate(AggregateFunction::Min),
            "Max" => Method::Aggregate(AggregateFunction::Max),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_unambiguous() {
        let table = DispatchTable::builtin().unwrap();
        assert_eq!(table.len(), builtin_signatures().len());
        assert!(!table.is_empty());
    }

    #[test]
    fn test_duplicate_signature_is_rejected() {
        let mut signatures = builtin_signatures();
        signatures.push((sig("Where", &[Q, L1]), Operator::TakeWhile));

        let err = DispatchTable::new(signatures).unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
        assert!(err.to_string().contains("Where(query, lambda/1)"));
    }

    #[test]
    fn test_group_by_overloads_by_lambda_arity() {
        let table = dispatch_table();
        assert_eq!(
            table.lookup("GroupBy", &[Q, L1, L1]),
            Some(Operator::GroupBy {
                element: true,
                result: false
            })
        );
        assert_eq!(
            table.lookup("GroupBy", &[Q, L1, L2]),
            Some(Operator::GroupBy {
                element: false,
                result: true
            })
        );
    }

    #[test]
    fn test_element_overloads() {
        let table = dispatch_table();
        assert_eq!(
            table.lookup("FirstOrDefault", &[Q, L1, V]),
            Some(Operator::Element {
                kind: ElementKind::First,
                or_default: true,
                predicate: true,
                default: true,
            })
        );
        assert_eq!(table.lookup("First", &[Q, V]), None);
        assert_eq!(
            table.lookup("Single", &[Q]),
            Some(Operator::Element {
                kind: ElementKind::Single,
                or_default: false,
                predicate: false,
                default: false,
            })
        );
    }

    #[test]
    fn test_join_kinds() {
        let table = dispatch_table();
        assert_eq!(
            table.lookup("GroupJoin", &[Q, Q, L1, L1, L2]),
            Some(Operator::Join(JoinKind::LeftOuter))
        );
        assert_eq!(table.lookup("Join", &[Q, Q, L1, L1]), None);
    }

    #[test]
    fn test_unknown_operator_misses() {
        assert_eq!(dispatch_table().lookup("Zip", &[Q, Q]), None);
        assert_eq!(dispatch_table().lookup("Take", &[Q, Q]), None);
    }

    #[test]
    fn test_terminal_and_write_flags() {
        assert!(Operator::All.is_terminal());
        assert!(!Operator::Where.is_terminal());
        assert!(Operator::Delete { row: false }.is_write());
        assert!(!Operator::Contains.is_write());
    }

    #[test]
    fn test_method_names() {
        assert_eq!(Method::from_name("StartsWith"), Some(Method::StartsWith));
        assert_eq!(
            Method::from_name("Sum"),
            Some(Method::Aggregate(AggregateFunction::Sum))
        );
        assert_eq!(Method::from_name("Soundex"), None);
    }
}
