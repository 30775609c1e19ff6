//! Assertions over execution records.

use crate::execution::{Execution, ExecutionStatus, NodeStatus};

/// Asserts the execution's status.
pub fn assert_execution_status(execution: &Execution, expected: ExecutionStatus) {
    assert_eq!(
        execution.status, expected,
        "Expected execution status {expected:?}, got {:?} (error: {:?})",
        execution.status, execution.error
    );
}

/// Asserts the status of the stage record matching `stage` by ID or name.
pub fn assert_stage_status(execution: &Execution, stage: &str, expected: NodeStatus) {
    let Some(record) = execution.stage(stage) else {
        panic!("Expected a record for stage '{stage}', found none");
    };
    assert_eq!(
        record.status, expected,
        "Expected stage '{stage}' to be {expected:?}, got {:?}",
        record.status
    );
}

/// Asserts that no stage record matching `stage` exists.
pub fn assert_stage_absent(execution: &Execution, stage: &str) {
    assert!(
        execution.stage(stage).is_none(),
        "Expected no record for stage '{stage}'"
    );
}

/// Asserts the completion fields agree with the status.
pub fn assert_completion_consistent(execution: &Execution) {
    let terminal = execution.is_terminal();
    assert_eq!(
        execution.completed_at.is_some(),
        terminal,
        "completed_at must be set exactly when the status is terminal ({:?})",
        execution.status
    );
    if let (Some(completed), Some(duration)) = (execution.completed_at, execution.duration_ms) {
        assert_eq!(
            duration,
            (completed - execution.started_at).num_milliseconds()
        );
    }
}
