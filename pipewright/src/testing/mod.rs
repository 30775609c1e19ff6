//! Testing utilities for pipewright engines.
//!
//! This module provides:
//! - Mock step handlers
//! - Assertions over execution records
//! - Sample definitions and polling helpers

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_completion_consistent, assert_execution_status, assert_stage_absent,
    assert_stage_status,
};
pub use fixtures::{command_step, custom_step, sample_pipeline, wait_for, wait_for_terminal};
pub use mocks::{FailingHandler, FlakyHandler, PanickingHandler, RecordedCall, RecordingHandler};
