//! Expression handles and the expression tree walked by the built-in evaluator
//!
//! The calculator itself only ever sees [`ExpressionId`] handles; what an id
//! stands for is up to the [`ExpressionEvaluator`](crate::evaluator::ExpressionEvaluator)
//! that issued it. [`Expression`] is the tree form used by
//! [`AstEvaluator`](crate::evaluator::AstEvaluator) and by dataset descriptors.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to an expression owned by an evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpressionId(pub u32);

impl ExpressionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which generation of bindings an expression is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Previous record's bindings, the baseline for change detection
    Old,
    /// Look-ahead bindings: current fields, estimated variables
    Estimated,
    /// Current bindings
    #[default]
    Default,
}

/// Expression (produces a value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    /// Literal value
    Literal { value: Value },

    /// Report parameter: `$P{name}`
    Parameter { name: String },

    /// Record field: `$F{name}`
    Field { name: String },

    /// Report variable: `$V{name}`
    Variable { name: String },

    /// Resource bundle message: `$R{key}`
    Resource { key: String },

    /// Binary operation: `a + b`, `a == b`, etc.
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// Unary operation: `!a`, `-a`
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// Conditional: `if condition then expr else expr`
    If {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal {
            value: value.into(),
        }
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Expression::Parameter { name: name.into() }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Expression::Field { name: name.into() }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable { name: name.into() }
    }

    pub fn resource(key: impl Into<String>) -> Self {
        Expression::Resource { key: key.into() }
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Visit every name this expression reads, depth first
    pub fn for_each_reference<'a>(&'a self, visit: &mut impl FnMut(&'a Expression)) {
        match self {
            Expression::Literal { .. } | Expression::Resource { .. } => {}
            Expression::Parameter { .. }
            | Expression::Field { .. }
            | Expression::Variable { .. } => visit(self),
            Expression::BinaryOp { left, right, .. } => {
                left.for_each_reference(visit);
                right.for_each_reference(visit);
            }
            Expression::UnaryOp { operand, .. } => operand.for_each_reference(visit),
            Expression::If {
                condition,
                then_expr,
                else_expr,
            } => {
                condition.for_each_reference(visit);
                then_expr.for_each_reference(visit);
                else_expr.for_each_reference(visit);
            }
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    // Arithmetic
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
    Modulo,   // %

    // Comparison
    Equal,              // ==
    NotEqual,           // !=
    LessThan,           // <
    LessThanOrEqual,    // <=
    GreaterThan,        // >
    GreaterThanOrEqual, // >=

    // Logical
    And, // and
    Or,  // or

    // Null coalescing
    NullCoalesce, // ??

    // String concatenation
    Concat, // ++
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Not,    // !
    Negate, // -
}
