//! Error types for fillcalc
//!
//! Evaluation failures are a single family: every error raised while a
//! [`Calculator`](crate::calculator::Calculator) pass touches an expression
//! carries the failing expression's identity and the underlying cause.

use crate::expression::ExpressionId;
use std::fmt;
use thiserror::Error;

/// Kind of name a reference resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Parameter,
    Field,
    Variable,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Parameter => write!(f, "parameter"),
            BindingKind::Field => write!(f, "field"),
            BindingKind::Variable => write!(f, "variable"),
        }
    }
}

/// Underlying cause of an evaluation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalErrorKind {
    #[error("no {kind} named '{name}' is bound")]
    MissingBinding { kind: BindingKind, name: String },

    #[error("resource key '{0}' not found")]
    MissingResource(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression is not known to the evaluator")]
    UnknownExpression,

    #[error("{0}")]
    Evaluator(String),
}

/// An expression failed to evaluate.
///
/// `expression` is absent when an aggregation failed on a variable that has
/// no update expression of its own.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to evaluate {}: {kind}", describe_expression(.expression))]
pub struct EvaluationError {
    pub expression: Option<ExpressionId>,
    pub kind: EvalErrorKind,
}

impl EvaluationError {
    pub fn new(expression: ExpressionId, kind: EvalErrorKind) -> Self {
        Self {
            expression: Some(expression),
            kind,
        }
    }
}

fn describe_expression(expression: &Option<ExpressionId>) -> String {
    match expression {
        Some(id) => format!("expression {}", id),
        None => "aggregation".to_string(),
    }
}

/// The evaluator rejected the dataset bindings it was initialized with
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluatorInitError {
    #[error("expression {expression} references unknown {kind} '{name}'")]
    UnresolvedReference {
        expression: ExpressionId,
        kind: BindingKind,
        name: String,
    },

    #[error("{0}")]
    Evaluator(String),
}

/// A dataset descriptor could not be loaded or built
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid JSON descriptor: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML descriptor: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid YAML descriptor: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported descriptor format '{0}' (expected json, toml, yaml or yml)")]
    UnsupportedFormat(String),

    #[error("{owner} references unknown group '{group}'")]
    UnknownGroup { owner: String, group: String },

    #[error("{owner} uses group scope but names no group")]
    MissingGroup { owner: String },

    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    #[error(transparent)]
    Init(#[from] EvaluatorInitError),
}
