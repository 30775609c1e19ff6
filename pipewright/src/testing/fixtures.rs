//! Test fixtures: sample definitions and polling helpers.

use std::time::Duration;

use anyhow::{bail, Context};

use crate::definition::{Job, Pipeline, Stage, Step};
use crate::engine::Engine;
use crate::execution::Execution;

/// A command step.
#[must_use]
pub fn command_step(name: &str, command: &str) -> Step {
    Step::command(name, command)
}

/// A step run by the custom handler registered as `handler`.
#[must_use]
pub fn custom_step(name: &str, handler: &str) -> Step {
    Step::custom(name, handler, serde_json::Value::Null)
}

/// A two-stage pipeline: `build` then `deploy`, which depends on `build`.
///
/// Both stages run one job with one step using the `handler` custom kind.
#[must_use]
pub fn sample_pipeline(handler: &str) -> Pipeline {
    Pipeline::new("sample")
        .with_stage(
            Stage::new("build")
                .with_job(Job::new("compile").with_step(custom_step("compile", handler))),
        )
        .with_stage(
            Stage::new("deploy")
                .depends_on("build")
                .with_job(Job::new("ship").with_step(custom_step("ship", handler))),
        )
}

/// Polls until the execution is terminal or `timeout` elapses.
pub async fn wait_for_terminal(
    engine: &Engine,
    execution_id: &str,
    timeout: Duration,
) -> anyhow::Result<Execution> {
    wait_for(engine, execution_id, timeout, Execution::is_terminal).await
}

/// Polls until `predicate` holds for the execution or `timeout` elapses.
pub async fn wait_for<P>(
    engine: &Engine,
    execution_id: &str,
    timeout: Duration,
    predicate: P,
) -> anyhow::Result<Execution>
where
    P: Fn(&Execution) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let execution = engine
            .get_execution(execution_id)
            .with_context(|| format!("execution {execution_id} disappeared"))?;
        if predicate(&execution) {
            return Ok(execution);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "execution {execution_id} still {} after {timeout:?}",
                execution.status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
