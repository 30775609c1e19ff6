//! Execution records: one tree per run, mirroring the definition.

use super::{ExecutionParams, ExecutionStatus, NodeStatus, TriggerSource};
use crate::definition::{DefinitionKind, DefinitionMeta};
use crate::errors::{EngineError, Result};
use crate::store::Record;
use crate::utils::{duration_ms, generate_time_ordered_id, now};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Start/finish timestamps shared by every execution node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// When the node started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at` in milliseconds.
    pub duration_ms: Option<i64>,
}

impl Timing {
    /// Timing for a node that starts now.
    #[must_use]
    pub fn started() -> Self {
        Self {
            started_at: Some(now()),
            completed_at: None,
            duration_ms: None,
        }
    }

    /// Records completion once; later calls are ignored.
    pub fn complete(&mut self) {
        if self.completed_at.is_some() {
            return;
        }
        let completed = now();
        let started = *self.started_at.get_or_insert(completed);
        self.completed_at = Some(completed);
        self.duration_ms = Some(duration_ms(started, completed));
    }
}

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Progress.
    Info,
    /// Skips and recoverable problems.
    Warn,
    /// Failures.
    Error,
}

/// One timestamped line in an execution's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was written.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// The text.
    pub message: String,
}

/// Per-run record of one step (or workflow action).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    /// The definition step's ID.
    pub step_id: String,
    /// The step's name.
    pub name: String,
    /// The step's handler key.
    pub step_type: String,
    /// Current status.
    pub status: NodeStatus,
    /// Timestamps.
    #[serde(flatten)]
    pub timing: Timing,
    /// Retries performed (attempts after the first).
    pub retry_count: u32,
    /// Values produced by the handler.
    pub output: HashMap<String, serde_json::Value>,
    /// Failure message.
    pub error: Option<String>,
    /// Captured output lines.
    pub logs: Vec<String>,
}

/// Workflow runs record their actions with the same shape as steps.
pub type ExecutionStep = StepExecution;

impl StepExecution {
    /// A step that starts running now.
    #[must_use]
    pub fn running(step_id: &str, name: &str, step_type: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            name: name.to_string(),
            step_type: step_type.to_string(),
            status: NodeStatus::Running,
            timing: Timing::started(),
            retry_count: 0,
            output: HashMap::new(),
            error: None,
            logs: Vec::new(),
        }
    }

    /// A step that was never started.
    #[must_use]
    pub fn skipped(step_id: &str, name: &str, step_type: &str) -> Self {
        let mut step = Self::running(step_id, name, step_type);
        step.status = NodeStatus::Skipped;
        step.timing.complete();
        step
    }
}

/// Per-run record of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    /// The definition job's ID.
    pub job_id: String,
    /// The job's name.
    pub name: String,
    /// Current status.
    pub status: NodeStatus,
    /// Timestamps.
    #[serde(flatten)]
    pub timing: Timing,
    /// Steps that started or were skipped, in order.
    pub steps: Vec<StepExecution>,
    /// Failure message.
    pub error: Option<String>,
}

impl JobExecution {
    /// A job that starts running now.
    #[must_use]
    pub fn running(job_id: &str, name: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            name: name.to_string(),
            status: NodeStatus::Running,
            timing: Timing::started(),
            steps: Vec::new(),
            error: None,
        }
    }
}

/// Per-run record of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecution {
    /// The definition stage's ID.
    pub stage_id: String,
    /// The stage's name.
    pub name: String,
    /// Current status.
    pub status: NodeStatus,
    /// Timestamps.
    #[serde(flatten)]
    pub timing: Timing,
    /// Jobs that started, in order.
    pub jobs: Vec<JobExecution>,
    /// Failure message. Skipped stages carry none.
    pub error: Option<String>,
}

impl StageExecution {
    /// A stage that starts running now.
    #[must_use]
    pub fn running(stage_id: &str, name: &str) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            name: name.to_string(),
            status: NodeStatus::Running,
            timing: Timing::started(),
            jobs: Vec::new(),
            error: None,
        }
    }

    /// A stage recorded as skipped without running.
    #[must_use]
    pub fn skipped(stage_id: &str, name: &str) -> Self {
        let mut stage = Self::running(stage_id, name);
        stage.status = NodeStatus::Skipped;
        stage.timing.complete();
        stage
    }

    /// Returns true if `reference` names this stage by ID or name.
    #[must_use]
    pub fn is_named(&self, reference: &str) -> bool {
        (!self.stage_id.is_empty() && self.stage_id == reference) || self.name == reference
    }
}

/// One run of a pipeline or workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique, time-ordered ID.
    pub id: String,
    /// The definition that was run.
    pub definition_id: String,
    /// Pipeline or workflow.
    pub definition_kind: DefinitionKind,
    /// The definition's name at the time of the run.
    pub definition_name: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// Source branch.
    pub branch: Option<String>,
    /// Commit SHA.
    pub commit: Option<String>,
    /// Who caused the run.
    pub author: Option<String>,
    /// What caused the run.
    pub trigger: TriggerSource,
    /// Set at creation.
    pub started_at: DateTime<Utc>,
    /// Set once, when the status becomes terminal.
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at` in milliseconds, set with `completed_at`.
    pub duration_ms: Option<i64>,
    /// Stage records (pipelines).
    pub stages: Vec<StageExecution>,
    /// Action records (workflows).
    pub steps: Vec<ExecutionStep>,
    /// Shared variables; step outputs are merged in as steps finish.
    pub variables: HashMap<String, serde_json::Value>,
    /// The parameters the run was created with.
    pub params: ExecutionParams,
    /// ID of the execution this run retries.
    pub retry_of: Option<String>,
    /// Append-only log.
    pub logs: Vec<LogEntry>,
    /// IDs of attached artifacts.
    pub artifacts: Vec<String>,
    /// Failure message for terminal failures.
    pub error: Option<String>,
}

impl Record for Execution {
    const KIND: &'static str = "execution";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Execution {
    /// Creates a pending execution for a definition.
    ///
    /// Variables are layered: the definition's, then the caller's, then the
    /// well-known `branch`/`commit`/`author`/`trigger` keys.
    #[must_use]
    pub fn new(kind: DefinitionKind, meta: &DefinitionMeta, params: ExecutionParams) -> Self {
        let mut variables = meta.variables.clone();
        variables.extend(params.variables.clone());
        for (key, value) in [
            ("branch", params.branch.as_ref()),
            ("commit", params.commit.as_ref()),
            ("author", params.author.as_ref()),
        ] {
            if let Some(v) = value {
                variables.insert(key.to_string(), serde_json::Value::String(v.clone()));
            }
        }
        variables.insert(
            "trigger".to_string(),
            serde_json::Value::String(params.trigger.to_string()),
        );

        Self {
            id: generate_time_ordered_id(),
            definition_id: meta.id.clone(),
            definition_kind: kind,
            definition_name: meta.name.clone(),
            status: ExecutionStatus::Pending,
            branch: params.branch.clone(),
            commit: params.commit.clone(),
            author: params.author.clone(),
            trigger: params.trigger,
            started_at: now(),
            completed_at: None,
            duration_ms: None,
            stages: Vec::new(),
            steps: Vec::new(),
            variables,
            params,
            retry_of: None,
            logs: Vec::new(),
            artifacts: Vec::new(),
            error: None,
        }
    }

    /// Returns true once the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves to `next`, stamping completion on terminal statuses.
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() && self.completed_at.is_none() {
            let completed = now();
            self.completed_at = Some(completed);
            self.duration_ms = Some(duration_ms(self.started_at, completed));
        }
        Ok(())
    }

    /// Moves to a terminal failure with a message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(ExecutionStatus::Failure)?;
        let error = error.into();
        self.log(LogLevel::Error, error.clone());
        self.error = Some(error);
        Ok(())
    }

    /// Appends a log line.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: now(),
            level,
            message: message.into(),
        });
    }

    /// Marks every node still pending or running with `status`.
    ///
    /// Used when a run ends abruptly (cancel, timeout, panic).
    pub fn close_open_nodes(&mut self, status: NodeStatus) {
        fn close(node_status: &mut NodeStatus, timing: &mut Timing, status: NodeStatus) {
            if !node_status.is_terminal() {
                *node_status = status;
                timing.complete();
            }
        }

        for stage in &mut self.stages {
            for job in &mut stage.jobs {
                for step in &mut job.steps {
                    close(&mut step.status, &mut step.timing, status);
                }
                close(&mut job.status, &mut job.timing, status);
            }
            close(&mut stage.status, &mut stage.timing, status);
        }
        for step in &mut self.steps {
            close(&mut step.status, &mut step.timing, status);
        }
    }

    /// Iterates every step record, across stages and jobs or the flat list.
    pub fn all_steps(&self) -> impl Iterator<Item = &StepExecution> {
        self.stages
            .iter()
            .flat_map(|s| &s.jobs)
            .flat_map(|j| &j.steps)
            .chain(self.steps.iter())
    }

    /// Finds a stage record by stage ID or name.
    #[must_use]
    pub fn stage(&self, reference: &str) -> Option<&StageExecution> {
        self.stages.iter().find(|s| s.is_named(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> DefinitionMeta {
        let mut meta = DefinitionMeta::new("ci");
        meta.id = "def-1".to_string();
        meta.variables.insert("env".to_string(), json!("staging"));
        meta.variables.insert("branch".to_string(), json!("ignored"));
        meta
    }

    #[test]
    fn test_new_layers_variables() {
        let params = ExecutionParams::manual()
            .with_branch("main")
            .with_variable("env", json!("prod"));
        let exec = Execution::new(DefinitionKind::Pipeline, &meta(), params);

        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.variables["env"], "prod");
        assert_eq!(exec.variables["branch"], "main");
        assert_eq!(exec.variables["trigger"], "manual");
        assert!(exec.completed_at.is_none());
        assert_eq!(exec.definition_name, "ci");
    }

    #[test]
    fn test_transition_sets_completion_once() {
        let mut exec = Execution::new(DefinitionKind::Workflow, &meta(), ExecutionParams::manual());
        exec.transition(ExecutionStatus::Running).unwrap();
        assert!(exec.completed_at.is_none());

        exec.transition(ExecutionStatus::Success).unwrap();
        let completed = exec.completed_at.unwrap();
        assert_eq!(
            exec.duration_ms,
            Some((completed - exec.started_at).num_milliseconds())
        );

        let err = exec.transition(ExecutionStatus::Failure).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(exec.completed_at, Some(completed));
    }

    #[test]
    fn test_fail_records_error_and_log() {
        let mut exec = Execution::new(DefinitionKind::Pipeline, &meta(), ExecutionParams::manual());
        exec.fail("queue full").unwrap();

        assert_eq!(exec.status, ExecutionStatus::Failure);
        assert_eq!(exec.error.as_deref(), Some("queue full"));
        assert_eq!(exec.logs.last().unwrap().level, LogLevel::Error);
    }

    #[test]
    fn test_close_open_nodes() {
        let mut exec = Execution::new(DefinitionKind::Pipeline, &meta(), ExecutionParams::manual());
        let mut stage = StageExecution::running("s1", "build");
        let mut job = JobExecution::running("j1", "cargo");
        job.steps.push(StepExecution::running("st1", "compile", "command"));
        stage.jobs.push(job);
        exec.stages.push(stage);
        exec.stages.push(StageExecution::skipped("s2", "deploy"));

        exec.close_open_nodes(NodeStatus::Cancelled);

        assert_eq!(exec.stages[0].status, NodeStatus::Cancelled);
        assert_eq!(exec.stages[0].jobs[0].steps[0].status, NodeStatus::Cancelled);
        assert!(exec.stages[0].timing.completed_at.is_some());
        assert_eq!(exec.stages[1].status, NodeStatus::Skipped);
        assert_eq!(exec.all_steps().count(), 1);
        assert!(exec.stage("build").is_some());
        assert!(exec.stage("s2").is_some());
    }

    #[test]
    fn test_timing_complete_is_idempotent() {
        let mut timing = Timing::started();
        timing.complete();
        let first = timing.completed_at;
        timing.complete();
        assert_eq!(timing.completed_at, first);
        assert!(timing.duration_ms.unwrap() >= 0);
    }
}
