//! Aggregation strategies
//!
//! A strategy folds a freshly evaluated expression value into a variable's
//! running value. The fold base is always the variable's current value;
//! while the variable is freshly initialized the base counts as empty, so
//! the first record of an epoch replaces the initial value.
//!
//! The [`ValueProvider`] tells a strategy which generation of *other*
//! variables to read. Averages use it to pick the count and sum helpers'
//! current values during calculation and their estimated values during
//! look-ahead.

use crate::error::EvalErrorKind;
use crate::value::Value;
use crate::variable::{Variable, VariableId};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Which generation of variable values a strategy reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueProvider {
    Current,
    Estimated,
}

impl ValueProvider {
    pub fn value(self, variable: &Variable) -> &Value {
        match self {
            ValueProvider::Current => variable.value(),
            ValueProvider::Estimated => variable.estimated_value(),
        }
    }
}

/// User-supplied aggregation
pub trait Incrementer: fmt::Debug + Send + Sync {
    /// Combine `expression_value` with `variable`'s running value.
    ///
    /// `variables` is the whole variable arena, in evaluation order; entries
    /// before `variable` have already been updated in this pass.
    fn increment(
        &self,
        variable: &Variable,
        expression_value: Value,
        provider: ValueProvider,
        variables: &[Variable],
    ) -> Result<Value, EvalErrorKind>;
}

/// Aggregation applied to a variable on every record
#[derive(Debug, Clone)]
pub enum Calculation {
    /// The expression value itself
    Nothing,
    /// Number of non-null expression values
    Count,
    Sum,
    /// `sum / count` read from two helper variables evaluated earlier
    Average { count: VariableId, sum: VariableId },
    Lowest,
    Highest,
    /// First expression value of the epoch
    First,
    /// Value is maintained by the caller and left untouched
    System,
    Custom(Arc<dyn Incrementer>),
}

impl Calculation {
    pub fn increment(
        &self,
        variable: &Variable,
        expression_value: Value,
        provider: ValueProvider,
        variables: &[Variable],
    ) -> Result<Value, EvalErrorKind> {
        let initialized = variable.is_initialized();
        let base = variable.value();

        match self {
            Calculation::Nothing => Ok(expression_value),

            Calculation::System => Ok(base.clone()),

            Calculation::Count => {
                let start = if initialized || base.is_null() {
                    Value::Int(0)
                } else {
                    base.clone()
                };
                if expression_value.is_null() {
                    Ok(start)
                } else {
                    start.add(&Value::Int(1))
                }
            }

            Calculation::Sum => {
                if expression_value.is_null() {
                    return Ok(if initialized { Value::Null } else { base.clone() });
                }
                if initialized || base.is_null() {
                    expect_number(expression_value)
                } else {
                    base.add(&expression_value)
                }
            }

            Calculation::Average { count, sum } => {
                if expression_value.is_null() {
                    return Ok(if initialized { Value::Null } else { base.clone() });
                }
                let count = helper(variables, *count, provider)?;
                let sum = helper(variables, *sum, provider)?;
                match count {
                    Value::Null | Value::Int(0) => Ok(Value::Null),
                    count => sum.divide(count),
                }
            }

            Calculation::Lowest => extreme(base, expression_value, initialized, Ordering::Less),

            Calculation::Highest => {
                extreme(base, expression_value, initialized, Ordering::Greater)
            }

            Calculation::First => Ok(if initialized {
                expression_value
            } else {
                base.clone()
            }),

            Calculation::Custom(incrementer) => {
                incrementer.increment(variable, expression_value, provider, variables)
            }
        }
    }
}

fn helper(
    variables: &[Variable],
    id: VariableId,
    provider: ValueProvider,
) -> Result<&Value, EvalErrorKind> {
    variables
        .get(id.index())
        .map(|v| provider.value(v))
        .ok_or_else(|| EvalErrorKind::Evaluator(format!("average helper {} does not exist", id)))
}

fn expect_number(value: Value) -> Result<Value, EvalErrorKind> {
    match value {
        Value::Int(_) | Value::Float(_) => Ok(value),
        other => Err(EvalErrorKind::TypeMismatch(format!(
            "cannot sum {} values",
            other.type_name()
        ))),
    }
}

fn extreme(
    base: &Value,
    expression_value: Value,
    initialized: bool,
    keep_when: Ordering,
) -> Result<Value, EvalErrorKind> {
    if expression_value.is_null() {
        return Ok(if initialized { Value::Null } else { base.clone() });
    }
    if initialized || base.is_null() {
        return Ok(expression_value);
    }
    if expression_value.compare(base)? == keep_when {
        Ok(expression_value)
    } else {
        Ok(base.clone())
    }
}
