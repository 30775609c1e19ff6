//! Execution and node status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a whole execution.
///
/// Transitions only move forward: `Pending → Running → {Success, Failure,
/// Cancelled}`, plus `Pending → {Failure, Cancelled}`. Terminal states are
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created and waiting for a worker.
    Pending,
    /// Owned by a worker.
    Running,
    /// Every stage finished without a blocking failure.
    Success,
    /// A step, stage, timeout or panic failed the run.
    Failure,
    /// Cancelled on request.
    Cancelled,
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ExecutionStatus {
    /// Returns true for `Success`, `Failure` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }

    /// Returns true if moving from `self` to `next` keeps status monotonic.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failure | Self::Cancelled),
            Self::Running => matches!(next, Self::Success | Self::Failure | Self::Cancelled),
            Self::Success | Self::Failure | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status of a stage, job or step inside an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not started.
    Pending,
    /// Currently running.
    Running,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failure,
    /// Not run (dependency gate, disabled, or earlier failure).
    Skipped,
    /// Stopped by cancellation.
    Cancelled,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl NodeStatus {
    /// Returns true once the node can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_transitions() {
        use ExecutionStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failure));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Success));
        assert!(Running.can_transition_to(Success));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Running));

        for terminal in [Success, Failure, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Running, Success, Failure, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_node_status() {
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert_eq!(NodeStatus::default(), NodeStatus::Pending);
        assert_eq!(
            serde_json::to_string(&NodeStatus::Skipped).unwrap(),
            r#""skipped""#
        );
    }
}
