//! Runs one execution end-to-end on a worker.

use super::gate;
use super::queue::QueuedRun;
use super::recorder::{Recorder, StepResult, StepSlot};
use super::EngineInner;
use crate::cancellation::CancellationToken;
use crate::definition::{Pipeline, RunPlan, Stage, Step, Workflow};
use crate::errors::{EngineError, StepExecutionError};
use crate::events::names;
use crate::execution::{ExecutionStatus, LogLevel, NodeStatus};
use crate::executor::StepContext;
use crate::retry::run_with_retry;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How a run (or one of its nodes) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Success,
    Failed(String),
    Cancelled(String),
}

/// Processes one dequeued run. Never panics and never returns early without
/// leaving the execution terminal.
pub(crate) async fn process(inner: Arc<EngineInner>, run: QueuedRun) {
    let execution_id = run.execution_id.clone();

    let started = inner.executions.update(&execution_id, |exec| {
        exec.transition(ExecutionStatus::Running).map(|()| {
            exec.log(LogLevel::Info, "execution started");
        })
    });
    match started {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!(
                execution_id = %execution_id,
                reason = %e,
                "Skipping execution that is no longer pending"
            );
            inner.tokens.release(&execution_id);
            return;
        }
        Err(e) => {
            warn!(execution_id = %execution_id, error = %e, "Dequeued execution has no record");
            inner.tokens.release(&execution_id);
            return;
        }
    }

    info!(execution_id = %execution_id, "Execution started");
    inner
        .event_sink
        .emit(names::EXECUTION_STARTED, Some(json!({ "execution_id": execution_id })))
        .await;

    let timeout_secs = run
        .plan
        .timeout_secs()
        .unwrap_or(inner.config.default_timeout_secs);
    let work = AssertUnwindSafe(run_plan(&inner, &run)).catch_unwind();

    let outcome = match tokio::time::timeout(Duration::from_secs(timeout_secs), work).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!(
                execution_id = %execution_id,
                panic = %message,
                "Recovered from panic while running execution"
            );
            Outcome::Failed(EngineError::PanicRecovered(message).to_string())
        }
        Err(_) => {
            run.token.cancel("timeout");
            warn!(execution_id = %execution_id, timeout_secs, "Execution timed out");
            Outcome::Failed(EngineError::Timeout { seconds: timeout_secs }.to_string())
        }
    };

    finalize(&inner, &execution_id, outcome).await;
    inner.tokens.release(&execution_id);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Closes open nodes and moves the execution to its terminal status.
///
/// An execution that is already terminal (cancelled by request) keeps its
/// status; only its open nodes are closed.
async fn finalize(inner: &EngineInner, execution_id: &str, outcome: Outcome) {
    let finished = inner.executions.update(execution_id, |exec| {
        match &outcome {
            Outcome::Success => {}
            Outcome::Failed(_) => exec.close_open_nodes(NodeStatus::Failure),
            Outcome::Cancelled(_) => exec.close_open_nodes(NodeStatus::Cancelled),
        }
        if exec.is_terminal() {
            return None;
        }
        let result = match &outcome {
            Outcome::Success => exec
                .transition(ExecutionStatus::Success)
                .map(|()| exec.log(LogLevel::Info, "execution succeeded")),
            Outcome::Failed(message) => exec.fail(message.clone()),
            Outcome::Cancelled(reason) => exec.transition(ExecutionStatus::Cancelled).map(|()| {
                exec.log(LogLevel::Warn, format!("execution cancelled: {reason}"));
            }),
        };
        match result {
            Ok(()) => Some((exec.status, exec.duration_ms)),
            Err(e) => {
                warn!(execution_id = %exec.id, error = %e, "Could not finalize execution");
                None
            }
        }
    });

    let Ok(Some((status, duration_ms))) = finished else {
        return;
    };

    let event = match status {
        ExecutionStatus::Success => names::EXECUTION_COMPLETED,
        ExecutionStatus::Cancelled => names::EXECUTION_CANCELLED,
        _ => names::EXECUTION_FAILED,
    };
    let error = match &outcome {
        Outcome::Failed(message) | Outcome::Cancelled(message) => Some(message.clone()),
        Outcome::Success => None,
    };
    info!(
        execution_id = %execution_id,
        status = %status,
        duration_ms = ?duration_ms,
        "Execution finished"
    );
    inner
        .event_sink
        .emit(
            event,
            Some(json!({
                "execution_id": execution_id,
                "status": status,
                "duration_ms": duration_ms,
                "error": error,
            })),
        )
        .await;
}

async fn run_plan(inner: &EngineInner, run: &QueuedRun) -> Outcome {
    match &run.plan {
        RunPlan::Pipeline(pipeline) => run_pipeline(inner, run, pipeline).await,
        RunPlan::Workflow(workflow) => run_workflow(inner, run, workflow).await,
    }
}

fn cancelled(token: &CancellationToken) -> Option<Outcome> {
    token.request().map(|request| {
        debug!(
            reason = %request.reason,
            requested_at = %request.requested_at,
            "Stopping at cancellation point"
        );
        Outcome::Cancelled(request.reason.clone())
    })
}

async fn run_pipeline(inner: &EngineInner, run: &QueuedRun, pipeline: &Pipeline) -> Outcome {
    let recorder = Recorder::new(&inner.executions, &run.execution_id);

    for stage in &pipeline.stages {
        if let Some(outcome) = cancelled(&run.token) {
            return outcome;
        }

        let gate_result = if stage.enabled {
            inner
                .executions
                .read(&run.execution_id, |exec| gate::check(exec, stage))
                .unwrap_or(Ok(()))
        } else {
            Ok(())
        };
        let skip_reason = match gate_result {
            _ if !stage.enabled => Some("stage disabled".to_string()),
            Err(EngineError::DependencyNotSatisfied { dependency, .. }) => {
                Some(format!("dependency '{dependency}' has not succeeded"))
            }
            _ => None,
        };
        if let Some(reason) = skip_reason {
            debug!(
                execution_id = %run.execution_id,
                stage = %stage.name,
                reason = %reason,
                "Stage skipped"
            );
            recorder.stage_skipped(stage, &reason);
            emit_stage(inner, run, names::STAGE_SKIPPED, stage, Some(reason.as_str())).await;
            continue;
        }

        let index = recorder.stage_started(stage);
        emit_stage(inner, run, names::STAGE_STARTED, stage, None).await;

        let outcome = run_stage(inner, run, &recorder, index, stage).await;
        match &outcome {
            Outcome::Success => {
                recorder.stage_finished(index, NodeStatus::Success, None);
                emit_stage(inner, run, names::STAGE_COMPLETED, stage, None).await;
            }
            Outcome::Failed(message) => {
                recorder.stage_finished(index, NodeStatus::Failure, Some(message.clone()));
                emit_stage(inner, run, names::STAGE_FAILED, stage, Some(message.as_str())).await;
                return Outcome::Failed(format!("stage '{}' failed: {message}", stage.name));
            }
            Outcome::Cancelled(_) => {
                recorder.stage_finished(index, NodeStatus::Cancelled, None);
                return outcome;
            }
        }
    }
    Outcome::Success
}

async fn emit_stage(
    inner: &EngineInner,
    run: &QueuedRun,
    event: &str,
    stage: &Stage,
    detail: Option<&str>,
) {
    inner
        .event_sink
        .emit(
            event,
            Some(json!({
                "execution_id": run.execution_id,
                "stage": stage.name,
                "stage_id": stage.id,
                "detail": detail,
            })),
        )
        .await;
}

async fn run_stage(
    inner: &EngineInner,
    run: &QueuedRun,
    recorder: &Recorder<'_>,
    stage_index: usize,
    stage: &Stage,
) -> Outcome {
    for job in &stage.jobs {
        if let Some(outcome) = cancelled(&run.token) {
            return outcome;
        }

        let job_index = recorder.job_started(stage_index, job);
        inner
            .event_sink
            .emit(
                names::JOB_STARTED,
                Some(json!({
                    "execution_id": run.execution_id,
                    "stage": stage.name,
                    "job": job.name,
                })),
            )
            .await;

        let slot = StepSlot::Job {
            stage: stage_index,
            job: job_index,
        };
        let outcome = run_steps(inner, run, recorder, slot, &job.steps).await;

        let (status, error) = match &outcome {
            Outcome::Success => (NodeStatus::Success, None),
            Outcome::Failed(message) => (NodeStatus::Failure, Some(message.clone())),
            Outcome::Cancelled(_) => (NodeStatus::Cancelled, None),
        };
        recorder.job_finished(stage_index, job_index, status, error);
        inner
            .event_sink
            .emit(
                names::JOB_FINISHED,
                Some(json!({
                    "execution_id": run.execution_id,
                    "stage": stage.name,
                    "job": job.name,
                    "status": status,
                })),
            )
            .await;

        if outcome != Outcome::Success {
            return outcome;
        }
    }
    Outcome::Success
}

async fn run_workflow(inner: &EngineInner, run: &QueuedRun, workflow: &Workflow) -> Outcome {
    let recorder = Recorder::new(&inner.executions, &run.execution_id);
    run_steps(inner, run, &recorder, StepSlot::Workflow, &workflow.actions).await
}

/// Runs steps in order. A failed step stops the list unless it allows
/// continuing.
async fn run_steps(
    inner: &EngineInner,
    run: &QueuedRun,
    recorder: &Recorder<'_>,
    slot: StepSlot,
    steps: &[Step],
) -> Outcome {
    for step in steps {
        if let Some(outcome) = cancelled(&run.token) {
            return outcome;
        }
        if !step.enabled {
            recorder.step_skipped(slot, step);
            continue;
        }

        if let Err(message) = run_step(inner, run, recorder, slot, step).await {
            if let Some(outcome) = cancelled(&run.token) {
                return outcome;
            }
            if step.continue_on_error {
                recorder.log(
                    LogLevel::Warn,
                    format!("step '{}' failed but continue_on_error is set", step.name),
                );
                continue;
            }
            return Outcome::Failed(message);
        }
    }
    Outcome::Success
}

/// Runs one step under its retry policy and per-attempt timeout.
async fn run_step(
    inner: &EngineInner,
    run: &QueuedRun,
    recorder: &Recorder<'_>,
    slot: StepSlot,
    step: &Step,
) -> Result<(), String> {
    let variables = recorder.variables();
    let action = step.action.render(&variables);
    let index = recorder.step_started(slot, step);

    debug!(
        execution_id = %run.execution_id,
        step = %step.name,
        kind = %action.kind(),
        "Step started"
    );
    inner
        .event_sink
        .emit(
            names::STEP_STARTED,
            Some(json!({
                "execution_id": run.execution_id,
                "step": step.name,
                "type": action.kind(),
            })),
        )
        .await;

    let policy = step.retry.clone().unwrap_or_default();
    let timeout_secs = step
        .timeout_secs
        .unwrap_or(inner.config.default_step_timeout_secs);
    let ctx = StepContext::new(
        run.execution_id.clone(),
        step.name.clone(),
        variables,
        run.token.clone(),
    );

    let (action, ctx) = (&action, &ctx);
    let outcome = run_with_retry(&policy, &run.token, &step.name, |attempt| {
        let attempt_ctx = ctx.for_attempt(attempt);
        async move {
            if attempt > 1 {
                inner
                    .event_sink
                    .emit(
                        names::STEP_RETRYING,
                        Some(json!({
                            "execution_id": attempt_ctx.execution_id,
                            "step": attempt_ctx.step_name,
                            "attempt": attempt,
                        })),
                    )
                    .await;
            }
            match tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                inner.handlers.dispatch(action, &attempt_ctx),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StepExecutionError::timeout(&attempt_ctx.step_name, timeout_secs)),
            }
        }
    })
    .await;

    let retry_count = outcome.retries();
    let (result, returned) = match outcome.result {
        Ok(output) => {
            let logs = output
                .get("output")
                .and_then(serde_json::Value::as_str)
                .map(output_lines)
                .unwrap_or_default();
            (
                StepResult {
                    status: NodeStatus::Success,
                    retry_count,
                    output,
                    error: None,
                    logs,
                },
                Ok(()),
            )
        }
        Err(err) => {
            let logs = err.output.as_deref().map(output_lines).unwrap_or_default();
            let message = err.to_string();
            (
                StepResult {
                    status: NodeStatus::Failure,
                    retry_count,
                    output: crate::executor::StepOutput::new(),
                    error: Some(message.clone()),
                    logs,
                },
                Err(message),
            )
        }
    };

    let status = result.status;
    if returned.is_err() {
        warn!(
            execution_id = %run.execution_id,
            step = %step.name,
            attempts = outcome.attempts,
            error = ?result.error,
            "Step failed"
        );
    }
    recorder.step_finished(slot, index, &step.name, result);
    inner
        .event_sink
        .emit(
            names::STEP_FINISHED,
            Some(json!({
                "execution_id": run.execution_id,
                "step": step.name,
                "status": status,
                "attempts": outcome.attempts,
                "retry_count": retry_count,
            })),
        )
        .await;

    returned
}

fn output_lines(text: &str) -> Vec<String> {
    text.lines().map(ToString::to_string).collect()
}
