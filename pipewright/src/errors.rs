//! Error types for the pipewright engine.
//!
//! Every fallible public operation returns [`Result`], whose error side is the
//! [`EngineError`] taxonomy. Step-level failures are carried by
//! [`StepExecutionError`] and only surface as an `EngineError` when a caller
//! asks for them directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A definition failed validation and was not stored.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// An unknown definition, execution or artifact ID was requested.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The record kind ("pipeline", "execution", ...).
        kind: &'static str,
        /// The requested ID.
        id: String,
    },

    /// A record with the same ID is already stored.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// The record kind.
        kind: &'static str,
        /// The conflicting ID.
        id: String,
    },

    /// The execution queue was full; the execution was stored as failed.
    #[error(
        "execution queue is full (capacity {capacity}); execution {execution_id} marked failed"
    )]
    QueueFull {
        /// The execution that could not be enqueued.
        execution_id: String,
        /// The configured queue capacity.
        capacity: usize,
    },

    /// A step failed to run.
    #[error("{0}")]
    StepExecution(#[from] StepExecutionError),

    /// A stage dependency has not succeeded in the current run.
    #[error("stage '{stage}' depends on '{dependency}', which has not succeeded")]
    DependencyNotSatisfied {
        /// The gated stage.
        stage: String,
        /// The first unsatisfied dependency.
        dependency: String,
    },

    /// A worker recovered from a panic while processing an execution.
    #[error("panic recovered: {0}")]
    PanicRecovered(String),

    /// The definition exists but cannot be executed in its current status.
    #[error("{kind} '{id}' is {status} and cannot be executed")]
    InactiveDefinition {
        /// The definition kind.
        kind: &'static str,
        /// The definition ID.
        id: String,
        /// The current status.
        status: String,
    },

    /// A status transition that would break monotonicity was requested.
    #[error("invalid execution transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// The operation was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The operation exceeded its time budget.
    #[error("timed out after {seconds}s")]
    Timeout {
        /// The budget that was exceeded.
        seconds: u64,
    },

    /// An artifact upload exceeded the configured size limit.
    #[error("artifact exceeds maximum size of {limit} bytes")]
    ArtifactTooLarge {
        /// The configured limit in bytes.
        limit: u64,
    },

    /// The engine queue has been shut down.
    #[error("engine has been shut down")]
    EngineStopped,

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// A short machine-readable code for the error variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::QueueFull { .. } => "queue_full",
            Self::StepExecution(_) => "step_execution_error",
            Self::DependencyNotSatisfied { .. } => "dependency_not_satisfied",
            Self::PanicRecovered(_) => "panic_recovered",
            Self::InactiveDefinition { .. } => "inactive_definition",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Cancelled(_) => "cancelled",
            Self::Timeout { .. } => "timeout",
            Self::ArtifactTooLarge { .. } => "artifact_too_large",
            Self::EngineStopped => "engine_stopped",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Converts to a dictionary representation for API consumers.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        match self {
            Self::NotFound { kind, id } => {
                map.insert("kind".to_string(), serde_json::json!(kind));
                map.insert("id".to_string(), serde_json::json!(id));
            }
            Self::QueueFull { execution_id, capacity } => {
                map.insert("execution_id".to_string(), serde_json::json!(execution_id));
                map.insert("capacity".to_string(), serde_json::json!(capacity));
            }
            Self::Validation(err) => {
                if let Some(ref path) = err.path {
                    map.insert("path".to_string(), serde_json::json!(path));
                }
            }
            _ => {}
        }
        map
    }
}

/// Error raised when a definition has an invalid shape.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error(
    "validation failed{}: {message}",
    path.as_ref().map(|p| format!(" at {p}")).unwrap_or_default()
)]
pub struct ValidationError {
    /// The error message.
    pub message: String,
    /// Location of the offending field, e.g. `stages[1].jobs[0].steps[2]`.
    pub path: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// Sets the location of the offending field.
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Error raised when a single step or action fails.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("step '{step}' failed: {message}")]
pub struct StepExecutionError {
    /// The step name.
    pub step: String,
    /// What went wrong.
    pub message: String,
    /// Captured process or response output, if any.
    pub output: Option<String>,
    /// Process exit code, if the step spawned a process.
    pub exit_code: Option<i32>,
}

impl StepExecutionError {
    /// Creates a new step execution error.
    #[must_use]
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            output: None,
            exit_code: None,
        }
    }

    /// Attaches captured output.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Attaches a process exit code.
    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Creates a timeout error for a step.
    #[must_use]
    pub fn timeout(step: impl Into<String>, seconds: u64) -> Self {
        Self::new(step, format!("timed out after {seconds}s"))
    }
}
