//! Constraint priorities.

use std::fmt;

/// Strength with which a constraint (or stay) is maintained.
///
/// Everything but `Required` is a soft constraint and needs a solver that
/// supports soft constraints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Priority {
    Weak,
    Medium,
    Strong,
    #[default]
    Required,
}

impl Priority {
    pub fn is_required(self) -> bool {
        self == Priority::Required
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Weak => "weak",
            Priority::Medium => "medium",
            Priority::Strong => "strong",
            Priority::Required => "required",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Priority::Weak < Priority::Strong);
        assert!(Priority::Strong < Priority::Required);
        assert_eq!(Priority::default(), Priority::Required);
        assert!(!Priority::Medium.is_required());
    }
}
