//! Shell command steps.

use super::{unexpected_action, StepContext, StepHandler, StepOutput};
use crate::definition::StepAction;
use crate::errors::StepExecutionError;
use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs `<shell> -c <command>` and captures its output.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    shell: String,
}

impl CommandHandler {
    /// Creates a handler using the given shell.
    #[must_use]
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl StepHandler for CommandHandler {
    async fn run(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        let StepAction::Command {
            command,
            working_dir,
            env,
        } = action
        else {
            return Err(unexpected_action(ctx, "command", action));
        };

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(ctx.env_vars());
        cmd.envs(env);

        debug!(
            execution_id = %ctx.execution_id,
            step = %ctx.step_name,
            command = %command,
            "Running command"
        );
        run_process(cmd, ctx).await
    }
}

/// Spawns a prepared command, waits for it, and maps its result.
///
/// The child is killed if the returned future is dropped (step timeout).
/// Output is stdout followed by stderr.
pub(crate) async fn run_process(
    mut cmd: Command,
    ctx: &StepContext,
) -> Result<StepOutput, StepExecutionError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .map_err(|e| ctx.error(format!("failed to spawn process: {e}")))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    match output.status.code() {
        Some(0) => {
            let mut out = StepOutput::new();
            out.insert("output".to_string(), json!(combined));
            out.insert("exit_code".to_string(), json!(0));
            Ok(out)
        }
        Some(code) => Err(ctx
            .error(format!("exited with status {code}"))
            .with_output(combined)
            .with_exit_code(code)),
        None => Err(ctx
            .error("terminated by signal")
            .with_output(combined)),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx() -> StepContext {
        let mut vars = HashMap::new();
        vars.insert("greeting".to_string(), json!("hello"));
        StepContext::new("exec-1", "echo", vars, Arc::new(CancellationToken::new()))
    }

    fn command(cmd: &str) -> StepAction {
        StepAction::Command {
            command: cmd.to_string(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_command_success_captures_output() {
        let handler = CommandHandler::new("sh");
        let out = handler
            .run(&command("echo out; echo err 1>&2"), &ctx())
            .await
            .unwrap();

        assert_eq!(out["exit_code"], 0);
        let text = out["output"].as_str().unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[tokio::test]
    async fn test_command_sees_variables_and_env() {
        let handler = CommandHandler::new("sh");
        let action = StepAction::Command {
            command: "echo $PIPEWRIGHT_GREETING-$EXTRA".to_string(),
            working_dir: None,
            env: HashMap::from([("EXTRA".to_string(), "world".to_string())]),
        };
        let out = handler.run(&action, &ctx()).await.unwrap();
        assert_eq!(out["output"].as_str().unwrap().trim(), "hello-world");
    }

    #[tokio::test]
    async fn test_command_failure_carries_output() {
        let handler = CommandHandler::new("sh");
        let err = handler
            .run(&command("echo broken; exit 3"), &ctx())
            .await
            .unwrap_err();

        assert_eq!(err.exit_code, Some(3));
        assert!(err.output.unwrap().contains("broken"));
        assert_eq!(err.step, "echo");
    }

    #[tokio::test]
    async fn test_command_rejects_other_actions() {
        let handler = CommandHandler::new("sh");
        let err = handler
            .run(&StepAction::Delay { millis: 1 }, &ctx())
            .await
            .unwrap_err();
        assert!(err.message.contains("cannot run a 'delay' step"));
    }
}
