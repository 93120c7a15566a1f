//! Resource change actions.
//!
//! The engine reports each resource change as a list of primitive actions.
//! This module maps those lists onto the three pending-change categories.

use serde::{Deserialize, Serialize};

/// A primitive action in a resource change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeAction {
    /// Nothing to do.
    #[serde(rename = "no-op")]
    NoOp,
    /// Create the resource.
    #[serde(rename = "create")]
    Create,
    /// Read a data source.
    #[serde(rename = "read")]
    Read,
    /// Update the resource in place.
    #[serde(rename = "update")]
    Update,
    /// Destroy the resource.
    #[serde(rename = "delete")]
    Delete,
    /// Drop the resource from state without destroying it.
    #[serde(rename = "forget")]
    Forget,
}

/// How a resource change counts towards convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCategory {
    /// No pending change.
    None,
    /// Counts as an addition.
    Add,
    /// Counts as an in-place change.
    Change,
    /// Counts as a destruction.
    Destroy,
    /// Counts as both an addition and a destruction.
    Replace,
}

impl ChangeCategory {
    /// Classifies an action list.
    ///
    /// Returns `None` for combinations the engine does not produce.
    #[must_use]
    pub fn classify(actions: &[ChangeAction]) -> Option<Self> {
        use ChangeAction::{Create, Delete, Forget, NoOp, Read, Update};

        match actions {
            [NoOp | Read | Forget] => Some(Self::None),
            [Create] => Some(Self::Add),
            [Update] => Some(Self::Change),
            [Delete] => Some(Self::Destroy),
            [Delete, Create] | [Create, Delete] => Some(Self::Replace),
            _ => None,
        }
    }

    /// Returns true if the change adds a resource.
    #[must_use]
    pub const fn adds(self) -> bool {
        matches!(self, Self::Add | Self::Replace)
    }

    /// Returns true if the change destroys a resource.
    #[must_use]
    pub const fn destroys(self) -> bool {
        matches!(self, Self::Destroy | Self::Replace)
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Forget => "forget",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChangeAction::{Create, Delete, NoOp, Read, Update};

    #[test]
    fn test_single_actions() {
        assert_eq!(ChangeCategory::classify(&[NoOp]), Some(ChangeCategory::None));
        assert_eq!(ChangeCategory::classify(&[Read]), Some(ChangeCategory::None));
        assert_eq!(ChangeCategory::classify(&[Create]), Some(ChangeCategory::Add));
        assert_eq!(ChangeCategory::classify(&[Update]), Some(ChangeCategory::Change));
        assert_eq!(ChangeCategory::classify(&[Delete]), Some(ChangeCategory::Destroy));
    }

    #[test]
    fn test_replace_in_either_order() {
        let before = ChangeCategory::classify(&[Delete, Create]).unwrap();
        let after = ChangeCategory::classify(&[Create, Delete]).unwrap();
        assert_eq!(before, ChangeCategory::Replace);
        assert_eq!(after, ChangeCategory::Replace);
        assert!(before.adds() && before.destroys());
    }

    #[test]
    fn test_unsupported_combinations() {
        assert_eq!(ChangeCategory::classify(&[]), None);
        assert_eq!(ChangeCategory::classify(&[Update, Delete]), None);
    }

    #[test]
    fn test_action_names() {
        let parsed: Vec<ChangeAction> =
            serde_json::from_str(r#"["no-op", "delete", "create", "forget"]"#).unwrap();
        assert_eq!(parsed[0], NoOp);
        assert_eq!(parsed[3], ChangeAction::Forget);
        assert_eq!(parsed[1].to_string(), "delete");
    }
}
