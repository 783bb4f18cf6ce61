//! Expression trees for operator chains.
//!
//! An operator chain is an [`Expr::Call`] whose first argument is the
//! upstream query, bottoming out at an [`Expr::Source`]. Lambdas carry named
//! parameters; the name of the first parameter bound to a table becomes its
//! SQL alias.

use std::fmt;
use std::sync::Arc;

use sqlchain_core::{TableInfo, Value};

use crate::command::CommandSql;
use crate::dispatch::{ArgShape, Operator, dispatch_table};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Comparison
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,

    // Logical
    /// Logical AND
    And,
    /// Logical OR
    Or,

    // Arithmetic
    /// Addition (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Division (/)
    Div,
    /// Modulo (%)
    Mod,

    // Other
    /// String concatenation
    Concat,
    /// First non-null operand
    Coalesce,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
            BinaryOp::Coalesce => "COALESCE",
        }
    }

    /// The comparison that holds exactly when this one does not.
    pub const fn negate(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Lt),
            BinaryOp::Gt => Some(BinaryOp::Le),
            BinaryOp::Le => Some(BinaryOp::Gt),
            _ => None,
        }
    }

    /// Check if this is a comparison operator.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Check if this is `AND` or `OR`.
    pub const fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Entity table at the root of a chain.
#[derive(Debug, Clone)]
pub struct TableSource {
    pub info: Arc<TableInfo>,
}

/// Callback receiving the finished command of a translation.
#[derive(Clone)]
pub struct SqlHook(Arc<dyn Fn(&CommandSql) + Send + Sync>);

impl SqlHook {
    pub fn new(f: impl Fn(&CommandSql) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, command: &CommandSql) {
        (self.0)(command);
    }
}

impl fmt::Debug for SqlHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SqlHook")
    }
}

/// A lambda with named parameters.
#[derive(Debug, Clone)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
}

impl Lambda {
    pub fn new(params: Vec<String>, body: Expr) -> Self {
        Self { params, body }
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Build a one-parameter lambda.
///
/// ```
/// use sqlchain_query::lambda;
///
/// let adult = lambda("u", |u| u.member("age").ge(18));
/// assert_eq!(adult.params, vec!["u".to_string()]);
/// ```
pub fn lambda(param: &str, f: impl FnOnce(Expr) -> Expr) -> Lambda {
    Lambda::new(vec![param.to_string()], f(Expr::param(param)))
}

/// Build a two-parameter lambda.
pub fn lambda2(first: &str, second: &str, f: impl FnOnce(Expr, Expr) -> Expr) -> Lambda {
    Lambda::new(
        vec![first.to_string(), second.to_string()],
        f(Expr::param(first), Expr::param(second)),
    )
}

/// An operator or method call.
///
/// `op` is resolved from the name and argument shapes when the call is
/// built; `None` means no chain operator matches, which is either a scalar
/// method or an unsupported construct.
#[derive(Debug, Clone)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
    pub op: Option<Operator>,
}

impl Call {
    /// Build a call and resolve its operator tag.
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        let name = name.into();
        let shapes = Self::shapes_of(&args);
        let op = dispatch_table().lookup(&name, &shapes);
        Self { name, args, op }
    }

    fn shapes_of(args: &[Expr]) -> Vec<ArgShape> {
        args.iter().map(ArgShape::of).collect()
    }

    /// Argument shapes of this call.
    pub fn shapes(&self) -> Vec<ArgShape> {
        Self::shapes_of(&self.args)
    }

    /// `Name(shape, shape, ...)`, for diagnostics.
    pub fn signature(&self) -> String {
        let shapes: Vec<String> = self.shapes().iter().map(ToString::to_string).collect();
        format!("{}({})", self.name, shapes.join(", "))
    }

    /// Receiver (first argument).
    pub fn receiver(&self) -> Option<&Expr> {
        self.args.first()
    }

    /// Lambda argument at `index`.
    pub fn lambda(&self, index: usize) -> Option<&Lambda> {
        match self.args.get(index) {
            Some(Expr::Lambda(l)) => Some(l),
            _ => None,
        }
    }
}

/// An expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Lambda parameter reference
    Parameter(String),

    /// Member access (`target.name`)
    Member { target: Box<Expr>, name: String },

    /// Literal value
    Constant(Value),

    /// Captured value with a name, bound under that name
    Variable { name: String, value: Value },

    /// Binary operation
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation
    Unary { op: UnaryOp, expr: Box<Expr> },

    /// `test ? then : otherwise`
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },

    /// Operator or method call
    Call(Box<Call>),

    /// Lambda
    Lambda(Box<Lambda>),

    /// Anonymous projection (`new { a = .., b = .. }`)
    New(Vec<(String, Expr)>),

    /// Entity table
    Source(TableSource),

    /// Member values of one entity instance
    Row(Vec<(String, Value)>),

    /// SQL capture callback
    Hook(SqlHook),
}

impl Expr {
    // ==================== Constructors ====================

    /// Reference a lambda parameter.
    pub fn param(name: impl Into<String>) -> Self {
        Expr::Parameter(name.into())
    }

    /// Create a literal.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    /// Create a NULL literal.
    pub fn null() -> Self {
        Expr::Constant(Value::Null)
    }

    /// Create a named captured value.
    pub fn var(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Expr::Variable {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create an anonymous projection.
    pub fn new_object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        Expr::New(fields.into_iter().map(|(n, e)| (n.into(), e)).collect())
    }

    /// Create a conditional.
    pub fn condition(test: Expr, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then.into()),
            otherwise: Box::new(otherwise.into()),
        }
    }

    /// Create a call.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(Box::new(Call::new(name, args)))
    }

    /// Call a method with `self` as receiver.
    pub fn method(self, name: impl Into<String>, mut args: Vec<Expr>) -> Self {
        args.insert(0, self);
        Expr::call(name, args)
    }

    /// Access a member.
    pub fn member(self, name: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    // ==================== Comparison Operators ====================

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    /// `self IS NULL`
    pub fn is_null(self) -> Self {
        self.eq(Expr::null())
    }

    /// `self IS NOT NULL`
    pub fn is_not_null(self) -> Self {
        self.ne(Expr::null())
    }

    // ==================== Logical Operators ====================

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    // ==================== Arithmetic Operators ====================

    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Div, other)
    }

    pub fn modulo(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mod, other)
    }

    pub fn neg(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(self),
        }
    }

    /// First non-null of `self` and `other`.
    pub fn coalesce(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Coalesce, other)
    }

    // ==================== String Methods ====================

    /// String concatenation.
    pub fn concat(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Concat, other)
    }

    /// Substring test, or membership when `self` is a list value.
    pub fn contains(self, other: impl Into<Expr>) -> Self {
        self.method("Contains", vec![other.into()])
    }

    pub fn starts_with(self, other: impl Into<Expr>) -> Self {
        self.method("StartsWith", vec![other.into()])
    }

    pub fn ends_with(self, other: impl Into<Expr>) -> Self {
        self.method("EndsWith", vec![other.into()])
    }

    /// `self` is one of `values`, bound under `name`.
    pub fn is_in(self, name: &str, values: impl Into<Value>) -> Self {
        Expr::var(name, values).contains(self)
    }

    /// Character length.
    pub fn length(self) -> Self {
        self.method("Length", Vec::new())
    }

    /// 0-based position of `needle`, -1 when absent.
    pub fn index_of(self, needle: impl Into<Expr>) -> Self {
        self.method("IndexOf", vec![needle.into()])
    }

    /// Substring from 0-based `start`.
    pub fn substring(self, start: impl Into<Expr>, len: Option<Expr>) -> Self {
        let mut args = vec![start.into()];
        args.extend(len);
        self.method("Substring", args)
    }

    pub fn to_upper(self) -> Self {
        self.method("ToUpper", Vec::new())
    }

    pub fn to_lower(self) -> Self {
        self.method("ToLower", Vec::new())
    }

    pub fn trim(self) -> Self {
        self.method("Trim", Vec::new())
    }

    pub fn is_null_or_empty(self) -> Self {
        self.method("IsNullOrEmpty", Vec::new())
    }

    // ==================== Group Aggregates ====================

    /// Rows in a group.
    pub fn count(self) -> Self {
        self.method("Count", Vec::new())
    }

    /// Rows in a group matching `predicate`.
    pub fn count_where(self, predicate: Lambda) -> Self {
        self.method("Count", vec![predicate.into()])
    }

    pub fn sum(self, selector: Lambda) -> Self {
        self.method("Sum", vec![selector.into()])
    }

    pub fn average(self, selector: Lambda) -> Self {
        self.method("Average", vec![selector.into()])
    }

    pub fn min(self, selector: Lambda) -> Self {
        self.method("Min", vec![selector.into()])
    }

    pub fn max(self, selector: Lambda) -> Self {
        self.method("Max", vec![selector.into()])
    }

    // ==================== Inspection ====================

    /// Check if this expression produces rows (a source or a non-terminal
    /// chain operator over one).
    pub fn is_query(&self) -> bool {
        match self {
            Expr::Source(_) => true,
            Expr::Call(call) => {
                call.op.is_none_or(|op| !op.is_terminal())
                    && call.receiver().is_some_and(Expr::is_query)
            }
            _ => false,
        }
    }

    /// Number of chain operators above the source.
    pub fn chain_len(&self) -> usize {
        match self {
            Expr::Call(call) if call.receiver().is_some_and(Expr::is_query) => {
                1 + call.receiver().map_or(0, Expr::chain_len)
            }
            _ => 0,
        }
    }

    /// Short node kind name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Parameter(_) => "parameter",
            Expr::Member { .. } => "member access",
            Expr::Constant(_) => "constant",
            Expr::Variable { .. } => "variable",
            Expr::Binary { .. } => "binary expression",
            Expr::Unary { .. } => "unary expression",
            Expr::Conditional { .. } => "conditional",
            Expr::Call(_) => "call",
            Expr::Lambda(_) => "lambda",
            Expr::New(_) => "projection",
            Expr::Source(_) => "source",
            Expr::Row(_) => "row",
            Expr::Hook(_) => "hook",
        }
    }
}

impl From<Lambda> for Expr {
    fn from(lambda: Lambda) -> Self {
        Expr::Lambda(Box::new(lambda))
    }
}

impl From<Call> for Expr {
    fn from(call: Call) -> Self {
        Expr::Call(Box::new(call))
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Constant(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Constant(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Constant(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Constant(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Constant(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Constant(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Constant(Value::Double(n))
    }
}
