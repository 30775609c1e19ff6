//! Pipeline definitions: stages → jobs → steps.

use super::validation::{validate_meta, validate_step};
use super::{Definition, DefinitionKind, DefinitionMeta, RunPlan, Step};
use crate::errors::ValidationError;
use crate::executor::HandlerRegistry;
use crate::store::Record;
use crate::utils::generate_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_true() -> bool {
    true
}

/// An ordered group of steps run by one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job ID; assigned on create when empty.
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Steps, run in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Job {
    /// Creates an empty job.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// An ordered group of jobs, optionally gated on earlier stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage ID; assigned on create when empty.
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Jobs, run in order.
    #[serde(default)]
    pub jobs: Vec<Job>,
    /// IDs or names of earlier stages that must have succeeded.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Disabled stages are recorded as skipped.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Stage {
    /// Creates an enabled stage with no jobs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            jobs: Vec::new(),
            depends_on: Vec::new(),
            enabled: true,
        }
    }

    /// Sets the stage ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Appends a job.
    #[must_use]
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Adds a dependency on an earlier stage (by ID or name).
    #[must_use]
    pub fn depends_on(mut self, stage: impl Into<String>) -> Self {
        self.depends_on.push(stage.into());
        self
    }

    /// Disables the stage.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns true if `reference` names this stage by ID or name.
    #[must_use]
    pub fn is_named(&self, reference: &str) -> bool {
        (!self.id.is_empty() && self.id == reference) || self.name == reference
    }

    fn validate(&self, path: &str, handlers: &HandlerRegistry) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("stage name is required").at(path));
        }
        if self.depends_on.iter().any(|d| self.is_named(d)) {
            return Err(ValidationError::new(format!(
                "stage '{}' cannot depend on itself",
                self.name
            ))
            .at(format!("{path}.depends_on")));
        }
        if self.jobs.is_empty() {
            return Err(ValidationError::new("stage must have at least one job").at(path));
        }

        for (j, job) in self.jobs.iter().enumerate() {
            let job_path = format!("{path}.jobs[{j}]");
            if job.name.trim().is_empty() {
                return Err(ValidationError::new("job name is required").at(job_path));
            }
            if job.steps.is_empty() {
                return Err(ValidationError::new("job must have at least one step").at(job_path));
            }
            for (s, step) in job.steps.iter().enumerate() {
                validate_step(step, &format!("{job_path}.steps[{s}]"), handlers)?;
            }
        }
        Ok(())
    }
}

/// A pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Shared definition fields.
    #[serde(flatten)]
    pub meta: DefinitionMeta,
    /// Stages, walked in order.
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Creates an empty active pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: DefinitionMeta::new(name),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
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

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.meta.tags.push(tag.into());
        self
    }

    /// Total number of steps across all stages and jobs.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.stages
            .iter()
            .flat_map(|s| &s.jobs)
            .map(|j| j.steps.len())
            .sum()
    }
}

impl Record for Pipeline {
    const KIND: &'static str = "pipeline";

    fn id(&self) -> &str {
        &self.meta.id
    }
}

impl Definition for Pipeline {
    const DEFINITION_KIND: DefinitionKind = DefinitionKind::Pipeline;

    fn meta(&self) -> &DefinitionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut DefinitionMeta {
        &mut self.meta
    }

    fn validate(&self, handlers: &HandlerRegistry) -> Result<(), ValidationError> {
        validate_meta(&self.meta)?;
        if self.stages.is_empty() {
            return Err(ValidationError::new("pipeline must have at least one stage").at("stages"));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate(&format!("stages[{i}]"), handlers)?;
        }
        Ok(())
    }

    fn assign_nested_ids(&mut self) {
        for stage in &mut self.stages {
            if stage.id.is_empty() {
                stage.id = generate_id();
            }
            for job in &mut stage.jobs {
                if job.id.is_empty() {
                    job.id = generate_id();
                }
                for step in &mut job.steps {
                    if step.id.is_empty() {
                        step.id = generate_id();
                    }
                }
            }
        }
        for trigger in &mut self.meta.triggers {
            if trigger.id.is_empty() {
                trigger.id = generate_id();
            }
        }
    }

    fn into_plan(self) -> RunPlan {
        RunPlan::Pipeline(Arc::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use pretty_assertions::assert_eq;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::with_builtins(&EngineConfig::default())
    }

    fn one_step_stage(name: &str) -> Stage {
        Stage::new(name).with_job(Job::new("job").with_step(Step::command("run", "true")))
    }

    #[test]
    fn test_valid_pipeline() {
        let pipeline = Pipeline::new("ci")
            .with_stage(one_step_stage("build"))
            .with_stage(one_step_stage("test").depends_on("build"));

        assert!(pipeline.validate(&registry()).is_ok());
        assert_eq!(pipeline.step_count(), 2);
    }

    #[test]
    fn test_no_stages() {
        let err = Pipeline::new("ci").validate(&registry()).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("stages"));
    }

    #[test]
    fn test_empty_job() {
        let pipeline =
            Pipeline::new("ci").with_stage(Stage::new("build").with_job(Job::new("empty")));
        let err = pipeline.validate(&registry()).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("stages[0].jobs[0]"));
    }

    #[test]
    fn test_self_dependency() {
        let pipeline = Pipeline::new("ci").with_stage(one_step_stage("build").depends_on("build"));
        let err = pipeline.validate(&registry()).unwrap_err();
        assert!(err.message.contains("cannot depend on itself"));
    }

    #[test]
    fn test_unknown_step_type_path() {
        let pipeline = Pipeline::new("ci").with_stage(
            Stage::new("build").with_job(
                Job::new("job")
                    .with_step(Step::command("ok", "true"))
                    .with_step(Step::custom("bad", "nope", serde_json::Value::Null)),
            ),
        );
        let err = pipeline.validate(&registry()).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("stages[0].jobs[0].steps[1]"));
    }

    #[test]
    fn test_assign_nested_ids_keeps_existing() {
        let mut pipeline = Pipeline::new("ci").with_stage(one_step_stage("build").with_id("fixed"));
        pipeline.assign_nested_ids();

        let stage = &pipeline.stages[0];
        assert_eq!(stage.id, "fixed");
        assert!(!stage.jobs[0].id.is_empty());
        assert!(!stage.jobs[0].steps[0].id.is_empty());
    }

    #[test]
    fn test_deserialize_json_definition() {
        let pipeline: Pipeline = serde_json::from_value(serde_json::json!({
            "name": "ci",
            "tags": ["rust"],
            "stages": [{
                "name": "build",
                "jobs": [{"name": "cargo", "steps": [
                    {"name": "build", "type": "command", "command": "cargo build"}
                ]}]
            }]
        }))
        .unwrap();

        assert_eq!(pipeline.meta.name, "ci");
        assert_eq!(pipeline.meta.tags, vec!["rust"]);
        assert!(pipeline.stages[0].enabled);
        assert!(pipeline.validate(&registry()).is_ok());
    }
}
