//! Writes a worker's progress into the execution store.
//!
//! Every update is a short closure run under the store's write lock. Nodes are
//! addressed by index, which is stable because records are only appended.

use crate::definition::{Job, Stage, Step};
use crate::execution::{
    Execution, JobExecution, LogLevel, NodeStatus, StageExecution, StepExecution,
};
use crate::executor::StepOutput;
use crate::store::RecordStore;
use std::collections::HashMap;
use tracing::warn;

/// Where a step record lives inside an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepSlot {
    /// `stages[stage].jobs[job].steps`
    Job { stage: usize, job: usize },
    /// `steps` (workflow actions)
    Workflow,
}

/// The final state of one step.
#[derive(Debug, Clone)]
pub(crate) struct StepResult {
    pub status: NodeStatus,
    pub retry_count: u32,
    pub output: StepOutput,
    pub error: Option<String>,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Recorder<'a> {
    executions: &'a RecordStore<Execution>,
    execution_id: &'a str,
}

impl<'a> Recorder<'a> {
    pub fn new(executions: &'a RecordStore<Execution>, execution_id: &'a str) -> Self {
        Self {
            executions,
            execution_id,
        }
    }

    fn with<R: Default>(&self, f: impl FnOnce(&mut Execution) -> R) -> R {
        match self.executions.update(self.execution_id, f) {
            Ok(value) => value,
            Err(e) => {
                warn!(execution_id = %self.execution_id, error = %e, "Execution record missing");
                R::default()
            }
        }
    }

    pub fn variables(&self) -> HashMap<String, serde_json::Value> {
        self.executions
            .read(self.execution_id, |e| e.variables.clone())
            .unwrap_or_default()
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.with(|e| e.log(level, message));
    }

    pub fn stage_started(&self, stage: &Stage) -> usize {
        self.with(|e| {
            e.stages.push(StageExecution::running(&stage.id, &stage.name));
            e.log(LogLevel::Info, format!("stage '{}' started", stage.name));
            e.stages.len() - 1
        })
    }

    pub fn stage_skipped(&self, stage: &Stage, reason: &str) {
        self.with(|e| {
            e.stages.push(StageExecution::skipped(&stage.id, &stage.name));
            e.log(
                LogLevel::Warn,
                format!("stage '{}' skipped: {reason}", stage.name),
            );
        });
    }

    pub fn stage_finished(&self, index: usize, status: NodeStatus, error: Option<String>) {
        self.with(|e| {
            let line = e.stages.get_mut(index).map(|stage| {
                stage.status = status;
                stage.error = error;
                stage.timing.complete();
                format!("stage '{}' finished: {status}", stage.name)
            });
            if let Some(line) = line {
                e.log(level_for(status), line);
            }
        });
    }

    pub fn job_started(&self, stage: usize, job: &Job) -> usize {
        self.with(|e| {
            e.stages.get_mut(stage).map_or(0, |s| {
                s.jobs.push(JobExecution::running(&job.id, &job.name));
                s.jobs.len() - 1
            })
        })
    }

    pub fn job_finished(
        &self,
        stage: usize,
        index: usize,
        status: NodeStatus,
        error: Option<String>,
    ) {
        self.with(|e| {
            if let Some(job) = e.stages.get_mut(stage).and_then(|s| s.jobs.get_mut(index)) {
                job.status = status;
                job.error = error;
                job.timing.complete();
            }
        });
    }

    fn step_list<'e>(e: &'e mut Execution, slot: StepSlot) -> Option<&'e mut Vec<StepExecution>> {
        match slot {
            StepSlot::Job { stage, job } => e
                .stages
                .get_mut(stage)
                .and_then(|s| s.jobs.get_mut(job))
                .map(|j| &mut j.steps),
            StepSlot::Workflow => Some(&mut e.steps),
        }
    }

    pub fn step_started(&self, slot: StepSlot, step: &Step) -> usize {
        self.with(|e| {
            Self::step_list(e, slot).map_or(0, |steps| {
                steps.push(StepExecution::running(&step.id, &step.name, step.action.kind()));
                steps.len() - 1
            })
        })
    }

    pub fn step_skipped(&self, slot: StepSlot, step: &Step) {
        self.with(|e| {
            if let Some(steps) = Self::step_list(e, slot) {
                steps.push(StepExecution::skipped(&step.id, &step.name, step.action.kind()));
            }
            e.log(LogLevel::Info, format!("step '{}' skipped: disabled", step.name));
        });
    }

    /// Stores a step's result and merges its output into the shared variables.
    ///
    /// Output keys are merged as-is and also under `<step name>.<key>`.
    pub fn step_finished(&self, slot: StepSlot, index: usize, step_name: &str, result: StepResult) {
        self.with(|e| {
            for (key, value) in &result.output {
                e.variables.insert(key.clone(), value.clone());
                e.variables
                    .insert(format!("{step_name}.{key}"), value.clone());
            }
            if let Some(error) = &result.error {
                e.log(
                    LogLevel::Error,
                    format!("step '{step_name}' failed: {error}"),
                );
            }
            if let Some(record) = Self::step_list(e, slot).and_then(|s| s.get_mut(index)) {
                record.status = result.status;
                record.retry_count = result.retry_count;
                record.output = result.output;
                record.error = result.error;
                record.logs = result.logs;
                record.timing.complete();
            }
        });
    }
}

fn level_for(status: NodeStatus) -> LogLevel {
    match status {
        NodeStatus::Failure => LogLevel::Error,
        NodeStatus::Skipped | NodeStatus::Cancelled => LogLevel::Warn,
        _ => LogLevel::Info,
    }
}
