//! Runtime values held by variables, fields and parameters
//!
//! Values are deliberately small: reports aggregate numbers and group on
//! scalars. Arithmetic used by the aggregation strategies lives here so the
//! built-in evaluator and the incrementers agree on coercion rules.

use crate::error::EvalErrorKind;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Value representation (runtime values)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
        }
    }

    /// Convert to string representation
    pub fn to_string_repr(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Int(0) => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Null-aware inequality used for group break detection.
    ///
    /// `self` is the baseline (old) value. A null baseline differs from any
    /// non-null value; otherwise the comparison is structural, with `NaN`
    /// equal to itself so a NaN-valued break expression does not fire on
    /// every record.
    pub fn differs_from(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, other) => !other.is_null(),
            (Value::Float(l), Value::Float(r)) => l.to_bits() != r.to_bits() && l != r,
            (left, right) => left != right,
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value, EvalErrorKind> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(l), Value::Int(r)) => l
                .checked_add(*r)
                .map(Value::Int)
                .ok_or_else(|| EvalErrorKind::TypeMismatch("integer overflow in +".to_string())),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l + r)),
            (Value::Int(l), Value::Float(r)) => Ok(Value::Float(*l as f64 + r)),
            (Value::Float(l), Value::Int(r)) => Ok(Value::Float(l + *r as f64)),
            (l, r) => Err(invalid_operands("+", l, r)),
        }
    }

    pub fn subtract(&self, other: &Value) -> Result<Value, EvalErrorKind> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(l), Value::Int(r)) => l
                .checked_sub(*r)
                .map(Value::Int)
                .ok_or_else(|| EvalErrorKind::TypeMismatch("integer overflow in -".to_string())),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l - r)),
            (Value::Int(l), Value::Float(r)) => Ok(Value::Float(*l as f64 - r)),
            (Value::Float(l), Value::Int(r)) => Ok(Value::Float(l - *r as f64)),
            (l, r) => Err(invalid_operands("-", l, r)),
        }
    }

    pub fn multiply(&self, other: &Value) -> Result<Value, EvalErrorKind> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(l), Value::Int(r)) => l
                .checked_mul(*r)
                .map(Value::Int)
                .ok_or_else(|| EvalErrorKind::TypeMismatch("integer overflow in *".to_string())),
            (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l * r)),
            (Value::Int(l), Value::Float(r)) => Ok(Value::Float(*l as f64 * r)),
            (Value::Float(l), Value::Int(r)) => Ok(Value::Float(l * *r as f64)),
            (l, r) => Err(invalid_operands("*", l, r)),
        }
    }

    /// Division always yields a float, so averages of integer columns keep
    /// their fractional part.
    pub fn divide(&self, other: &Value) -> Result<Value, EvalErrorKind> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(_), Some(d)) if d == 0.0 => Err(EvalErrorKind::DivisionByZero),
                (Some(n), Some(d)) => Ok(Value::Float(n / d)),
                _ => Err(invalid_operands("/", l, r)),
            },
        }
    }

    pub fn modulo(&self, other: &Value) -> Result<Value, EvalErrorKind> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(_), Value::Int(0)) => Err(EvalErrorKind::DivisionByZero),
            (Value::Int(l), Value::Int(r)) => l
                .checked_rem(*r)
                .map(Value::Int)
                .ok_or_else(|| EvalErrorKind::TypeMismatch("integer overflow in %".to_string())),
            (l, r) => Err(invalid_operands("%", l, r)),
        }
    }

    /// Total order over comparable values. Numbers compare across int/float,
    /// strings and bools compare among themselves, anything else is a type
    /// mismatch. Null is not comparable; callers handle it first.
    pub fn compare(&self, other: &Value) -> Result<Ordering, EvalErrorKind> {
        match (self, other) {
            (Value::Int(l), Value::Int(r)) => Ok(l.cmp(r)),
            (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
            (Value::Bool(l), Value::Bool(r)) => Ok(l.cmp(r)),
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => Ok(a.total_cmp(&b)),
                _ => Err(EvalErrorKind::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    l.type_name(),
                    r.type_name()
                ))),
            },
        }
    }
}

fn invalid_operands(op: &str, left: &Value, right: &Value) -> EvalErrorKind {
    EvalErrorKind::TypeMismatch(format!(
        "invalid operands for {}: {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_repr())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_string() {
        assert_eq!(Value::String("hello".to_string()).to_string_repr(), "hello");
        assert_eq!(Value::Int(42).to_string_repr(), "42");
        assert_eq!(Value::Bool(true).to_string_repr(), "true");
        assert_eq!(Value::Null.to_string_repr(), "null");
    }

    #[test]
    fn test_differs_from_null_baseline() {
        assert!(Value::Null.differs_from(&Value::Int(1)));
        assert!(!Value::Null.differs_from(&Value::Null));
        assert!(Value::Int(1).differs_from(&Value::Null));
    }

    #[test]
    fn test_differs_from_structural() {
        assert!(!Value::from("north").differs_from(&Value::from("north")));
        assert!(Value::from("north").differs_from(&Value::from("south")));
        assert!(Value::Int(1).differs_from(&Value::Float(1.0)));
        assert!(!Value::Float(f64::NAN).differs_from(&Value::Float(f64::NAN)));
    }

    #[test]
    fn test_add_coerces_numbers() {
        assert_eq!(Value::Int(3).add(&Value::Int(4)), Ok(Value::Int(7)));
        assert_eq!(Value::Int(3).add(&Value::Float(0.5)), Ok(Value::Float(3.5)));
        assert_eq!(Value::Null.add(&Value::Int(4)), Ok(Value::Null));
        assert!(Value::from("a").add(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_divide() {
        assert_eq!(Value::Int(7).divide(&Value::Int(2)), Ok(Value::Float(3.5)));
        assert_eq!(
            Value::Int(7).divide(&Value::Int(0)),
            Err(EvalErrorKind::DivisionByZero)
        );
    }

    #[test]
    fn test_modulo() {
        assert_eq!(Value::Int(7).modulo(&Value::Int(3)), Ok(Value::Int(1)));
        assert_eq!(
            Value::Int(7).modulo(&Value::Int(0)),
            Err(EvalErrorKind::DivisionByZero)
        );
        assert_eq!(
            Value::Int(i64::MIN).modulo(&Value::Int(-1)),
            Err(EvalErrorKind::TypeMismatch("integer overflow in %".to_string()))
        );
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ok(Ordering::Less));
        assert_eq!(
            Value::from("b").compare(&Value::from("a")),
            Ok(Ordering::Greater)
        );
        assert!(Value::from("b").compare(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_untagged_deserialize() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(3),
                Value::Float(2.5),
                Value::from("x")
            ]
        );
    }
}
