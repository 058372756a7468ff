//! Report variables: running aggregates maintained by the calculator

use crate::expression::ExpressionId;
use crate::group::GroupId;
use crate::incrementer::Calculation;
use crate::scope::{ResetScope, ScopeBinding};
use crate::value::Value;
use std::fmt;

/// Name of the built-in page number variable
pub const PAGE_NUMBER: &str = "PAGE_NUMBER";

/// Name of the built-in column number variable
pub const COLUMN_NUMBER: &str = "COLUMN_NUMBER";

/// Position of a variable in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub usize);

impl VariableId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "variable {}", self.0)
    }
}

/// A named aggregate slot.
///
/// The reset axis decides when `value` goes back to the initial expression;
/// the increment axis decides when `incremented_value` snapshots `value`.
/// The two are independent.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    calculation: Calculation,
    expression: Option<ExpressionId>,
    initial_value_expression: Option<ExpressionId>,
    reset: ScopeBinding,
    increment: ScopeBinding,

    value: Value,
    old_value: Value,
    incremented_value: Value,
    estimated_value: Value,
    initialized: bool,
}

impl Variable {
    /// Create a variable that resets per report and snapshots on every record
    pub fn new(name: impl Into<String>, calculation: Calculation) -> Self {
        Self {
            name: name.into(),
            calculation,
            expression: None,
            initial_value_expression: None,
            reset: ScopeBinding::new(ResetScope::Report),
            increment: ScopeBinding::new(ResetScope::None),
            value: Value::Null,
            old_value: Value::Null,
            incremented_value: Value::Null,
            estimated_value: Value::Null,
            initialized: false,
        }
    }

    pub fn with_expression(mut self, expression: ExpressionId) -> Self {
        self.expression = Some(expression);
        self
    }

    pub fn with_initial_value(mut self, expression: ExpressionId) -> Self {
        self.initial_value_expression = Some(expression);
        self
    }

    pub fn reset_on(mut self, scope: ResetScope) -> Self {
        self.reset = ScopeBinding::new(scope);
        self
    }

    pub fn reset_on_group(mut self, group: GroupId) -> Self {
        self.reset = ScopeBinding::group(group);
        self
    }

    pub fn increment_on(mut self, scope: ResetScope) -> Self {
        self.increment = ScopeBinding::new(scope);
        self
    }

    pub fn increment_on_group(mut self, group: GroupId) -> Self {
        self.increment = ScopeBinding::group(group);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn calculation(&self) -> &Calculation {
        &self.calculation
    }

    pub fn expression(&self) -> Option<ExpressionId> {
        self.expression
    }

    pub fn initial_value_expression(&self) -> Option<ExpressionId> {
        self.initial_value_expression
    }

    pub fn reset(&self) -> ScopeBinding {
        self.reset
    }

    pub fn increment(&self) -> ScopeBinding {
        self.increment
    }

    pub fn reset_scope(&self) -> ResetScope {
        self.reset.scope
    }

    pub fn increment_scope(&self) -> ResetScope {
        self.increment.scope
    }

    /// Current (authoritative) value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Value as of the previous record
    pub fn old_value(&self) -> &Value {
        &self.old_value
    }

    /// Snapshot taken at the last increment boundary
    pub fn incremented_value(&self) -> &Value {
        &self.incremented_value
    }

    /// Look-ahead value from the last estimation pass
    pub fn estimated_value(&self) -> &Value {
        &self.estimated_value
    }

    /// True right after a reset, until the next record is folded in
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Overwrite the current value. Used by fillers for system variables
    /// such as [`PAGE_NUMBER`].
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    pub(crate) fn set_old_value(&mut self, value: Value) {
        self.old_value = value;
    }

    pub(crate) fn set_incremented_value(&mut self, value: Value) {
        self.incremented_value = value;
    }

    pub(crate) fn set_estimated_value(&mut self, value: Value) {
        self.estimated_value = value;
    }

    pub(crate) fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// Snapshot the current value as the incremented value
    pub(crate) fn snapshot(&mut self) {
        self.incremented_value = self.value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let variable = Variable::new("TOTAL", Calculation::Sum);
        assert_eq!(variable.reset_scope(), ResetScope::Report);
        assert_eq!(variable.increment_scope(), ResetScope::None);
        assert!(variable.value().is_null());
        assert!(!variable.is_initialized());
    }

    #[test]
    fn test_group_binding_builders() {
        let variable = Variable::new("CITY_TOTAL", Calculation::Sum)
            .reset_on_group(GroupId(1))
            .increment_on_group(GroupId(0));
        assert_eq!(variable.reset().group, Some(GroupId(1)));
        assert_eq!(variable.increment().group, Some(GroupId(0)));
        assert!(variable.increment().is_group());
    }

    #[test]
    fn test_snapshot() {
        let mut variable = Variable::new("TOTAL", Calculation::Sum);
        variable.set_value(Value::Int(5));
        variable.snapshot();
        assert_eq!(variable.incremented_value(), &Value::Int(5));
    }
}
