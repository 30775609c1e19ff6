//! Execution records and their state machine.
//!
//! An [`Execution`] mirrors the definition it runs: stage, job and step
//! records for pipelines, a flat list of step records for workflows. Its
//! status only moves forward, and `completed_at`/`duration_ms` are stamped
//! exactly once when it becomes terminal.

mod filter;
mod model;
mod params;
mod status;

pub use filter::ExecutionFilter;
pub use model::{
    Execution, ExecutionStep, JobExecution, LogEntry, LogLevel, StageExecution, StepExecution,
    Timing,
};
pub use params::{ExecutionParams, TriggerSource};
pub use status::{ExecutionStatus, NodeStatus};
