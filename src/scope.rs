//! Reset and increment scopes, and the containment rule between them
//!
//! A boundary event (the *trigger*) fires at one granularity. Whether it
//! touches a variable depends on the variable's own scope attribute:
//!
//! | trigger  | applies when attribute is                       |
//! |----------|-------------------------------------------------|
//! | `Report` | anything but `None`                             |
//! | `Page`   | `Page` or `Column`                              |
//! | `Column` | `Column`                                        |
//! | `Group`  | `Group`, and the bound group has changed        |
//!
//! `None` attributes are never reached through a boundary; the calculator
//! handles them on its own.

use crate::group::{Group, GroupId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity of a reset or increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetScope {
    #[default]
    None,
    Column,
    Page,
    Group,
    Report,
}

impl ResetScope {
    pub const ALL: [ResetScope; 5] = [
        ResetScope::None,
        ResetScope::Column,
        ResetScope::Page,
        ResetScope::Group,
        ResetScope::Report,
    ];
}

impl fmt::Display for ResetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetScope::None => write!(f, "none"),
            ResetScope::Column => write!(f, "column"),
            ResetScope::Page => write!(f, "page"),
            ResetScope::Group => write!(f, "group"),
            ResetScope::Report => write!(f, "report"),
        }
    }
}

/// Decide whether a boundary at `trigger` applies to an entity whose scope
/// attribute is `attribute`.
///
/// `group_changed` is only consulted for a group trigger on a group-scoped
/// attribute.
pub fn applies(
    trigger: ResetScope,
    attribute: ResetScope,
    group_changed: impl FnOnce() -> bool,
) -> bool {
    match (trigger, attribute) {
        (_, ResetScope::None) => false,
        (ResetScope::Report, _) => true,
        (ResetScope::Page, ResetScope::Page | ResetScope::Column) => true,
        (ResetScope::Column, ResetScope::Column) => true,
        (ResetScope::Group, ResetScope::Group) => group_changed(),
        _ => false,
    }
}

/// A scope attribute together with the group that gates it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeBinding {
    pub scope: ResetScope,
    pub group: Option<GroupId>,
}

impl ScopeBinding {
    pub fn new(scope: ResetScope) -> Self {
        Self { scope, group: None }
    }

    pub fn group(group: GroupId) -> Self {
        Self {
            scope: ResetScope::Group,
            group: Some(group),
        }
    }

    pub fn is_none(&self) -> bool {
        self.scope == ResetScope::None
    }

    pub fn is_group(&self) -> bool {
        self.scope == ResetScope::Group
    }

    /// Whether the bound group is currently marked as changed. An unbound
    /// or dangling group reference never counts as changed.
    pub fn group_changed(&self, groups: &[Group]) -> bool {
        self.group
            .and_then(|id| groups.get(id.index()))
            .is_some_and(Group::has_changed)
    }

    pub fn applies(&self, trigger: ResetScope, groups: &[Group]) -> bool {
        applies(trigger, self.scope, || self.group_changed(groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_applies_to_everything_but_none() {
        for scope in ResetScope::ALL {
            assert_eq!(
                applies(ResetScope::Report, scope, || false),
                scope != ResetScope::None,
                "{scope}"
            );
        }
    }

    #[test]
    fn test_page_contains_column() {
        assert!(applies(ResetScope::Page, ResetScope::Page, || false));
        assert!(applies(ResetScope::Page, ResetScope::Column, || false));
        assert!(!applies(ResetScope::Page, ResetScope::Report, || false));
        assert!(!applies(ResetScope::Page, ResetScope::Group, || true));
    }

    #[test]
    fn test_column_only_applies_to_column() {
        assert!(applies(ResetScope::Column, ResetScope::Column, || false));
        assert!(!applies(ResetScope::Column, ResetScope::Page, || false));
        assert!(!applies(ResetScope::Column, ResetScope::Report, || false));
    }

    #[test]
    fn test_group_gated_by_group_state() {
        assert!(applies(ResetScope::Group, ResetScope::Group, || true));
        assert!(!applies(ResetScope::Group, ResetScope::Group, || false));
        assert!(!applies(ResetScope::Group, ResetScope::Page, || true));
    }

    #[test]
    fn test_none_trigger_never_applies() {
        for scope in ResetScope::ALL {
            assert!(!applies(ResetScope::None, scope, || true));
        }
    }

    #[test]
    fn test_binding_reads_group_flag() {
        let mut groups = vec![Group::new("region", None), Group::new("city", None)];
        let binding = ScopeBinding::group(GroupId(1));
        assert!(!binding.applies(ResetScope::Group, &groups));

        groups[1].set_has_changed(true);
        assert!(binding.applies(ResetScope::Group, &groups));

        let dangling = ScopeBinding::group(GroupId(7));
        assert!(!dangling.applies(ResetScope::Group, &groups));
    }
}
