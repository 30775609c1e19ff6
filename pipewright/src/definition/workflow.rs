//! Workflow definitions: a flat, ordered list of actions.

use super::validation::{validate_meta, validate_step};
use super::{Action, Definition, DefinitionKind, DefinitionMeta, RunPlan};
use crate::errors::ValidationError;
use crate::executor::HandlerRegistry;
use crate::store::Record;
use crate::utils::generate_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Shared definition fields.
    #[serde(flatten)]
    pub meta: DefinitionMeta,
    /// Actions, run in order.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Workflow {
    /// Creates an empty active workflow.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: DefinitionMeta::new(name),
            actions: Vec::new(),
        }
    }

    /// Appends an action.
    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Attaches a trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: super::Trigger) -> Self {
        self.meta.triggers.push(trigger);
        self
    }

    /// Seeds an execution variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.variables.insert(key.into(), value);
        self
    }

    /// Sets the lifecycle status.
    #[must_use]
    pub fn with_status(mut self, status: super::DefinitionStatus) -> Self {
        self.meta.status = status;
        self
    }
}

impl Record for Workflow {
    const KIND: &'static str = "workflow";

    fn id(&self) -> &str {
        &self.meta.id
    }
}

impl Definition for Workflow {
    const DEFINITION_KIND: DefinitionKind = DefinitionKind::Workflow;

    fn meta(&self) -> &DefinitionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut DefinitionMeta {
        &mut self.meta
    }

    fn validate(&self, handlers: &HandlerRegistry) -> Result<(), ValidationError> {
        validate_meta(&self.meta)?;
        if self.actions.is_empty() {
            return Err(
                ValidationError::new("workflow must have at least one action").at("actions")
            );
        }
        for (i, action) in self.actions.iter().enumerate() {
            validate_step(action, &format!("actions[{i}]"), handlers)?;
        }
        Ok(())
    }

    fn assign_nested_ids(&mut self) {
        for action in &mut self.actions {
            if action.id.is_empty() {
                action.id = generate_id();
            }
        }
        for trigger in &mut self.meta.triggers {
            if trigger.id.is_empty() {
                trigger.id = generate_id();
            }
        }
    }

    fn into_plan(self) -> RunPlan {
        RunPlan::Workflow(Arc::new(self))
    }
}
