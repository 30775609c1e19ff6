//! Script steps: the body is written to a temp file and run by an interpreter.

use super::command::run_process;
use super::{unexpected_action, StepContext, StepHandler, StepOutput};
use crate::definition::StepAction;
use crate::errors::StepExecutionError;
use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

/// Runs script steps.
#[derive(Debug, Clone)]
pub struct ScriptHandler {
    default_interpreter: String,
}

impl ScriptHandler {
    /// Creates a handler whose scripts default to `interpreter`.
    #[must_use]
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            default_interpreter: interpreter.into(),
        }
    }
}

#[async_trait]
impl StepHandler for ScriptHandler {
    async fn run(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        let StepAction::Script {
            script,
            interpreter,
        } = action
        else {
            return Err(unexpected_action(ctx, "script", action));
        };

        // Removed from disk when dropped.
        let path = tempfile::Builder::new()
            .prefix("pipewright-")
            .suffix(".script")
            .tempfile()
            .map_err(|e| ctx.error(format!("failed to create script file: {e}")))?
            .into_temp_path();
        fs::write(&path, script)
            .await
            .map_err(|e| ctx.error(format!("failed to write script file: {e}")))?;

        let interpreter = interpreter.as_deref().unwrap_or(&self.default_interpreter);
        debug!(
            execution_id = %ctx.execution_id,
            step = %ctx.step_name,
            interpreter = %interpreter,
            "Running script"
        );

        let mut cmd = Command::new(interpreter);
        cmd.arg(&*path);
        cmd.envs(ctx.env_vars());
        run_process(cmd, ctx).await
    }
}
