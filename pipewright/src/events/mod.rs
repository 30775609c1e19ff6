//! Lifecycle event emission.
//!
//! The engine reports every execution, stage, job and step transition to an
//! [`EventSink`]. Sinks are per engine; the default discards everything.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// Event type names emitted by the engine.
pub mod names {
    /// An execution record was created and queued.
    pub const EXECUTION_QUEUED: &str = "execution.queued";
    /// A worker picked the execution up.
    pub const EXECUTION_STARTED: &str = "execution.started";
    /// The execution finished successfully.
    pub const EXECUTION_COMPLETED: &str = "execution.completed";
    /// The execution failed.
    pub const EXECUTION_FAILED: &str = "execution.failed";
    /// The execution was cancelled.
    pub const EXECUTION_CANCELLED: &str = "execution.cancelled";
    /// A stage started.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage completed.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage was skipped.
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    /// A stage failed.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A job started.
    pub const JOB_STARTED: &str = "job.started";
    /// A job finished (any status).
    pub const JOB_FINISHED: &str = "job.finished";
    /// A step started.
    pub const STEP_STARTED: &str = "step.started";
    /// A step is about to be retried.
    pub const STEP_RETRYING: &str = "step.retrying";
    /// A step finished (any status).
    pub const STEP_FINISHED: &str = "step.finished";
    /// An artifact was attached to an execution.
    pub const ARTIFACT_UPLOADED: &str = "artifact.uploaded";
}
