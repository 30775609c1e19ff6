//! Pipeline and workflow definitions.
//!
//! A definition is the stored description of work: a [`Pipeline`] is a tree
//! of stages, jobs and steps; a [`Workflow`] is a flat list of actions. Both
//! share [`DefinitionMeta`] (identity, status, triggers, variables, audit
//! fields) and implement [`Definition`], which is what the engine's
//! definition API is generic over.

mod filter;
mod pipeline;
mod step;
mod trigger;
mod validation;
mod workflow;

pub use filter::DefinitionFilter;
pub use pipeline::{Job, Pipeline, Stage};
pub use step::{Action, Step, StepAction};
pub use trigger::{Trigger, TriggerType};
pub use validation::{validate_meta, validate_step};
pub use workflow::Workflow;

use crate::errors::ValidationError;
use crate::executor::HandlerRegistry;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which kind of definition a record or execution belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    /// Stages → jobs → steps.
    Pipeline,
    /// Flat list of actions.
    Workflow,
}

impl DefinitionKind {
    /// Lowercase name, also used as the store's record kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Workflow => "workflow",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a definition. Only active definitions can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    /// Being edited; not executable.
    Draft,
    /// Executable and eligible for triggers.
    #[default]
    Active,
    /// Retired; kept for history.
    Archived,
}

impl fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Fields shared by every definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionMeta {
    /// Unique, immutable ID assigned on create.
    #[serde(default)]
    pub id: String,
    /// Display name; required.
    pub name: String,
    /// Free-form description, searched by list filters.
    #[serde(default)]
    pub description: Option<String>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: DefinitionStatus,
    /// Labels used by list filters.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Event triggers that auto-invoke this definition.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Variables seeded into every execution.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Whole-run timeout in seconds; defaulted from config on create.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Cron-style schedule. Stored for callers; the engine does not act on it.
    #[serde(default)]
    pub schedule: Option<String>,
    /// Creation time.
    #[serde(default = "crate::utils::now")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default = "crate::utils::now")]
    pub updated_at: DateTime<Utc>,
    /// Creator.
    #[serde(default)]
    pub created_by: String,
    /// Last updater.
    #[serde(default)]
    pub updated_by: String,
}

impl DefinitionMeta {
    /// Creates metadata with the given name and defaults elsewhere.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = crate::utils::now();
        Self {
            id: String::new(),
            name: name.into(),
            description: None,
            status: DefinitionStatus::default(),
            tags: Vec::new(),
            triggers: Vec::new(),
            variables: HashMap::new(),
            timeout_secs: None,
            schedule: None,
            created_at: now,
            updated_at: now,
            created_by: String::new(),
            updated_by: String::new(),
        }
    }
}

/// A resolved definition ready for a worker.
#[derive(Debug, Clone)]
pub enum RunPlan {
    /// Run stages → jobs → steps.
    Pipeline(Arc<Pipeline>),
    /// Run actions in order.
    Workflow(Arc<Workflow>),
}

impl RunPlan {
    /// The definition's run timeout, if set.
    #[must_use]
    pub fn timeout_secs(&self) -> Option<u64> {
        match self {
            Self::Pipeline(p) => p.meta.timeout_secs,
            Self::Workflow(w) => w.meta.timeout_secs,
        }
    }
}

/// Behaviour shared by pipelines and workflows.
pub trait Definition: Record + fmt::Debug + Serialize + DeserializeOwned {
    /// The kind of definition.
    const DEFINITION_KIND: DefinitionKind;

    /// Shared metadata.
    fn meta(&self) -> &DefinitionMeta;

    /// Mutable shared metadata.
    fn meta_mut(&mut self) -> &mut DefinitionMeta;

    /// Checks the definition's shape against the registered step handlers.
    fn validate(&self, handlers: &HandlerRegistry) -> Result<(), ValidationError>;

    /// Assigns IDs to nested stages/jobs/steps that lack one.
    fn assign_nested_ids(&mut self);

    /// Converts the definition into something a worker can run.
    fn into_plan(self) -> RunPlan;
}
