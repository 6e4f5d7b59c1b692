//! Scalar expressions and query operator trees.
//!
//! A query is composed as a [`QueryExpression`] tree of operators whose
//! predicates, keys and projections are scalar [`Expression`]s:
//!
//! ```rust
//! use quarry_query::expression::{Expression, Query};
//!
//! let query = Query::from("Order", "o")
//!     .filter(Expression::member("o", "Total").greater_than(100))
//!     .include(&["Lines"])
//!     .build();
//! assert_eq!(query.root_alias(), "o");
//! ```
//!
//! Member, method-call and parameter nodes are what callers write. Column,
//! SQL-function and LIKE nodes only appear after translation.

mod query;

use std::fmt;

use smol_str::SmolStr;

use crate::value::Value;

pub use query::{Projection, Query, QueryExpression};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// String concatenation.
    Concat,
}

impl BinaryOp {
    /// SQL operator text. `Concat` is dialect specific and rendered elsewhere.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Concat => "||",
        }
    }

    /// Whether the operator yields a boolean.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
                | Self::And
                | Self::Or
        )
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Concat => "++",
            other => other.as_sql(),
        }
    }
}

/// Identity of a called method: declaring type plus name, e.g. `string.starts_with`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodInfo {
    /// Declaring type, e.g. `string` or `math`.
    pub declaring_type: SmolStr,
    /// Method name.
    pub name: SmolStr,
}

impl MethodInfo {
    /// Create a method identity.
    pub fn new(declaring_type: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
        }
    }

    /// Whether this is `declaring_type.name`.
    pub fn is(&self, declaring_type: &str, name: &str) -> bool {
        self.declaring_type == declaring_type && self.name == name
    }
}

impl fmt::Display for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)
    }
}

/// A method-call node.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCallExpression {
    /// Receiver, `None` for static calls.
    pub object: Option<Box<Expression>>,
    /// Called method.
    pub method: MethodInfo,
    /// Arguments in call order.
    pub arguments: Vec<Expression>,
}

impl MethodCallExpression {
    /// Create a call node.
    pub fn new(object: Option<Expression>, method: MethodInfo, arguments: Vec<Expression>) -> Self {
        Self {
            object: object.map(Box::new),
            method,
            arguments,
        }
    }

    /// Whether the call is `declaring_type.name`.
    pub fn is(&self, declaring_type: &str, name: &str) -> bool {
        self.method.is(declaring_type, name)
    }
}

/// Scalar expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A property of a query source: `source.member`.
    Member {
        /// Source alias.
        source: SmolStr,
        /// Property name.
        member: SmolStr,
    },
    /// A translated column reference: `table.column`.
    Column {
        /// Table alias.
        table: SmolStr,
        /// Column name.
        column: SmolStr,
    },
    /// A literal.
    Constant(Value),
    /// A value supplied per execution.
    Parameter(SmolStr),
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// Logical negation.
    Not(Box<Expression>),
    /// Null test.
    IsNull(Box<Expression>),
    /// A method call, translated or evaluated in process.
    MethodCall(MethodCallExpression),
    /// A translated SQL function call.
    SqlFunction {
        /// Function name.
        name: SmolStr,
        /// Arguments.
        arguments: Vec<Expression>,
    },
    /// A translated `LIKE` test.
    Like {
        /// Matched operand.
        operand: Box<Expression>,
        /// Pattern.
        pattern: Box<Expression>,
        /// Escape character used by the pattern, if any.
        escape: Option<char>,
    },
}

impl Expression {
    /// `source.member`
    pub fn member(source: impl Into<SmolStr>, member: impl Into<SmolStr>) -> Self {
        Self::Member {
            source: source.into(),
            member: member.into(),
        }
    }

    /// `table.column`
    pub fn column(table: impl Into<SmolStr>, column: impl Into<SmolStr>) -> Self {
        Self::Column {
            table: table.into(),
            column: column.into(),
        }
    }

    /// A literal.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// A named parameter.
    pub fn parameter(name: impl Into<SmolStr>) -> Self {
        Self::Parameter(name.into())
    }

    /// An instance call `self.declaring_type::name(arguments)`.
    pub fn call(
        self,
        declaring_type: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        arguments: Vec<Expression>,
    ) -> Self {
        Self::MethodCall(MethodCallExpression::new(
            Some(self),
            MethodInfo::new(declaring_type, name),
            arguments,
        ))
    }

    /// A static call `declaring_type::name(arguments)`.
    pub fn static_call(
        declaring_type: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        arguments: Vec<Expression>,
    ) -> Self {
        Self::MethodCall(MethodCallExpression::new(
            None,
            MethodInfo::new(declaring_type, name),
            arguments,
        ))
    }

    /// A SQL function call.
    pub fn function(name: impl Into<SmolStr>, arguments: Vec<Expression>) -> Self {
        Self::SqlFunction {
            name: name.into(),
            arguments,
        }
    }

    /// A binary node.
    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `self = other`
    pub fn equal(self, other: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Equal, self, other.into())
    }

    /// `self <> other`
    pub fn not_equal(self, other: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::NotEqual, self, other.into())
    }

    /// `self < other`
    pub fn less_than(self, other: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::LessThan, self, other.into())
    }

    /// `self > other`
    pub fn greater_than(self, other: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::GreaterThan, self, other.into())
    }

    /// `self AND other`
    pub fn and(self, other: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::And, self, other.into())
    }

    /// `self OR other`
    pub fn or(self, other: impl Into<Expression>) -> Self {
        Self::binary(BinaryOp::Or, self, other.into())
    }

    /// `NOT self`
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// `self IS NULL`
    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }

    /// Split a predicate on top-level `AND`s.
    pub fn into_conjuncts(self) -> Vec<Expression> {
        match self {
            Self::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let mut conjuncts = left.into_conjuncts();
                conjuncts.extend(right.into_conjuncts());
                conjuncts
            }
            other => vec![other],
        }
    }

    /// Join predicates with `AND`; `None` when empty.
    pub fn conjunction(predicates: impl IntoIterator<Item = Expression>) -> Option<Self> {
        predicates.into_iter().reduce(|acc, next| acc.and(next))
    }

    /// Visit this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expression)) {
        f(self);
        match self {
            Self::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Self::Not(inner) | Self::IsNull(inner) => inner.walk(f),
            Self::MethodCall(call) => {
                if let Some(object) = &call.object {
                    object.walk(f);
                }
                for argument in &call.arguments {
                    argument.walk(f);
                }
            }
            Self::SqlFunction { arguments, .. } => {
                for argument in arguments {
                    argument.walk(f);
                }
            }
            Self::Like { operand, pattern, .. } => {
                operand.walk(f);
                pattern.walk(f);
            }
            Self::Member { .. } | Self::Column { .. } | Self::Constant(_) | Self::Parameter(_) => {}
        }
    }

    /// Every `(source, member)` pair referenced by this expression.
    pub fn members(&self) -> Vec<(&str, &str)> {
        let mut members = Vec::new();
        self.walk(&mut |node| {
            if let Self::Member { source, member } = node {
                members.push((source.as_str(), member.as_str()));
            }
        });
        members
    }

    /// The constant value, if this is a literal.
    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Self::Constant(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self::Constant(value)
    }
}

macro_rules! constant_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expression {
                fn from(value: $ty) -> Self {
                    Self::Constant(value.into())
                }
            }
        )*
    };
}

constant_from!(bool, i32, i64, f64, String, &str);

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member { source, member } => write!(f, "{}.{}", source, member),
            Self::Column { table, column } => write!(f, "{}.{}", table, column),
            Self::Constant(Value::String(s)) => write!(f, "'{}'", s),
            Self::Constant(value) => write!(f, "{}", value),
            Self::Parameter(name) => write!(f, "@{}", name),
            Self::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Self::Not(inner) => write!(f, "!{}", inner),
            Self::IsNull(inner) => write!(f, "{} is null", inner),
            Self::MethodCall(call) => {
                match &call.object {
                    Some(object) => write!(f, "{}.{}(", object, call.method.name)?,
                    None => write!(f, "{}(", call.method)?,
                }
                write_arguments(f, &call.arguments)?;
                write!(f, ")")
            }
            Self::SqlFunction { name, arguments } => {
                write!(f, "{}(", name)?;
                write_arguments(f, arguments)?;
                write!(f, ")")
            }
            Self::Like { operand, pattern, .. } => write!(f, "{} like {}", operand, pattern),
        }
    }
}

fn write_arguments(f: &mut fmt::Formatter<'_>, arguments: &[Expression]) -> fmt::Result {
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", argument)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_conjuncts_flatten_nested_and() {
        let a = Expression::member("o", "A").equal(1);
        let b = Expression::member("o", "B").equal(2);
        let c = Expression::member("o", "C").equal(3);
        let predicate = a.clone().and(b.clone().and(c.clone()));

        assert_eq!(predicate.into_conjuncts(), vec![a, b, c]);
    }

    #[test]
    fn test_or_is_one_conjunct() {
        let predicate = Expression::member("o", "A")
            .equal(1)
            .or(Expression::member("o", "B").equal(2));
        assert_eq!(predicate.into_conjuncts().len(), 1);
    }

    #[test]
    fn test_members_and_display() {
        let expr = Expression::member("o", "Name")
            .call("string", "reverse", vec![])
            .equal("cba");

        assert_eq!(expr.members(), vec![("o", "Name")]);
        assert_eq!(expr.to_string(), "(o.Name.reverse() == 'cba')");
    }
}
