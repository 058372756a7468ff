//! Report groups: named break detectors

use crate::expression::ExpressionId;
use std::fmt;

/// Position of a group in outer-to-inner order (0 is outermost)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl GroupId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {}", self.0)
    }
}

/// A group breaks whenever its expression's value differs between the
/// previous record and the upcoming one.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    name: String,
    expression: Option<ExpressionId>,
    has_changed: bool,
    is_top_level_change: bool,
}

impl Group {
    pub fn new(name: impl Into<String>, expression: Option<ExpressionId>) -> Self {
        Self {
            name: name.into(),
            expression,
            has_changed: false,
            is_top_level_change: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> Option<ExpressionId> {
        self.expression
    }

    /// Whether the group breaks in the current cycle, either on its own
    /// expression or because an enclosing group broke
    pub fn has_changed(&self) -> bool {
        self.has_changed
    }

    /// Whether this is the outermost group whose own expression changed
    pub fn is_top_level_change(&self) -> bool {
        self.is_top_level_change
    }

    pub(crate) fn set_has_changed(&mut self, changed: bool) {
        self.has_changed = changed;
    }

    pub(crate) fn set_top_level_change(&mut self, top_level: bool) {
        self.is_top_level_change = top_level;
    }
}
