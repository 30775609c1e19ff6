//! # Pipewright
//!
//! An in-memory execution engine for pipeline and workflow definitions.
//!
//! Pipewright provides:
//!
//! - **Definition storage**: validated pipelines (stages → jobs → steps) and
//!   flat workflows (actions) with filtering and audit fields
//! - **Bounded execution**: a fixed worker pool fed by a capacity-bounded queue
//!   with non-blocking enqueue
//! - **Dependency gating**: stages run only when their declared prerequisites
//!   succeeded earlier in the same run
//! - **Retries**: per-step bounded attempts with exponential backoff
//! - **Event triggers**: push, pull request, tag and generic events auto-invoke
//!   matching definitions
//! - **Artifacts**: streamed byte blobs attached to executions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipewright::prelude::*;
//!
//! let engine = Engine::builder().config(EngineConfig::from_env()?).build()?;
//! engine.start();
//!
//! let pipeline = Pipeline::new("build")
//!     .with_stage(Stage::new("compile").with_job(
//!         Job::new("cargo").with_step(Step::command("build", "cargo build")),
//!     ));
//! let pipeline = engine.pipelines().create(pipeline, "alice")?;
//!
//! let execution = engine
//!     .pipelines()
//!     .execute(&pipeline.meta.id, ExecutionParams::manual().with_branch("main"))?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod cancellation;
pub mod config;
pub mod definition;
pub mod engine;
pub mod errors;
pub mod events;
pub mod execution;
pub mod executor;
pub mod observability;
pub mod retry;
pub mod store;
pub mod testing;
pub mod triggers;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{Artifact, ArtifactMeta, ArtifactStore};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::EngineConfig;
    pub use crate::definition::{
        Definition, DefinitionFilter, DefinitionKind, DefinitionMeta, DefinitionStatus, Job,
        Pipeline, Stage, Step, StepAction, Trigger, TriggerType, Workflow,
    };
    pub use crate::engine::{DefinitionApi, Engine, EngineBuilder, TriggerOutcome};
    pub use crate::errors::{EngineError, Result, StepExecutionError, ValidationError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::execution::{
        Execution, ExecutionFilter, ExecutionParams, ExecutionStatus, JobExecution, NodeStatus,
        StageExecution, StepExecution, TriggerSource,
    };
    pub use crate::executor::{HandlerRegistry, StepContext, StepHandler, StepOutput};
    pub use crate::retry::RetryPolicy;
    pub use crate::triggers::{Event, EventEnvelope};
}
