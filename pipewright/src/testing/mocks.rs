//! Mock step handlers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::definition::StepAction;
use crate::errors::StepExecutionError;
use crate::executor::{StepContext, StepHandler, StepOutput};

/// A handler that always fails with the same message.
#[derive(Debug)]
pub struct FailingHandler {
    error: String,
    calls: Mutex<u32>,
}

impl FailingHandler {
    /// Creates a failing handler.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            calls: Mutex::new(0),
        }
    }

    /// Number of attempts made against this handler.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl StepHandler for FailingHandler {
    async fn run(
        &self,
        _action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        *self.calls.lock() += 1;
        Err(ctx.error(self.error.clone()))
    }
}

/// A handler that fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyHandler {
    failures: u32,
    calls: Mutex<u32>,
}

impl FlakyHandler {
    /// Fails the first `failures` calls.
    #[must_use]
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: Mutex::new(0),
        }
    }

    /// Number of attempts made against this handler.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl StepHandler for FlakyHandler {
    async fn run(
        &self,
        _action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        if call <= self.failures {
            return Err(ctx.error(format!("flaky failure {call}")));
        }
        let mut out = StepOutput::new();
        out.insert("attempt".to_string(), json!(ctx.attempt));
        Ok(out)
    }
}

/// One call seen by a [`RecordingHandler`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Execution the step belonged to.
    pub execution_id: String,
    /// Step name.
    pub step_name: String,
    /// Attempt number.
    pub attempt: u32,
    /// The rendered action.
    pub action: StepAction,
    /// Variables visible to the step.
    pub variables: std::collections::HashMap<String, serde_json::Value>,
}

/// A handler that records every call and succeeds with a fixed output.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    output: StepOutput,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingHandler {
    /// Creates a recording handler with an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an output key returned on every call.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }

    /// All recorded calls, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Names of the steps run, in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.step_name.clone()).collect()
    }

    /// Number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl StepHandler for RecordingHandler {
    async fn run(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        self.calls.lock().push(RecordedCall {
            execution_id: ctx.execution_id.clone(),
            step_name: ctx.step_name.clone(),
            attempt: ctx.attempt,
            action: action.clone(),
            variables: ctx.variables.clone(),
        });
        Ok(self.output.clone())
    }
}

/// A handler that panics. Used to exercise worker recovery.
#[derive(Debug)]
pub struct PanickingHandler {
    message: String,
}

impl PanickingHandler {
    /// Creates a handler that panics with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl StepHandler for PanickingHandler {
    async fn run(
        &self,
        _action: &StepAction,
        _ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        panic!("{}", self.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx() -> StepContext {
        StepContext::new("exec-1", "step", HashMap::new(), Arc::new(CancellationToken::new()))
    }

    fn action() -> StepAction {
        StepAction::Custom {
            handler: "mock".to_string(),
            config: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_failing_handler() {
        let handler = FailingHandler::new("boom");
        let err = handler.run(&action(), &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(handler.call_count(), 1);
    }

    #[tokio::test]
    async fn test_flaky_handler() {
        let handler = FlakyHandler::new(2);
        assert!(handler.run(&action(), &ctx()).await.is_err());
        assert!(handler.run(&action(), &ctx()).await.is_err());

        let out = handler.run(&action(), &ctx().for_attempt(3)).await.unwrap();
        assert_eq!(out["attempt"], 3);
        assert_eq!(handler.call_count(), 3);
    }

    #[tokio::test]
    async fn test_recording_handler() {
        let handler = RecordingHandler::new().with_output("ok", json!(true));

        let out = handler.run(&action(), &ctx()).await.unwrap();
        assert_eq!(out["ok"], true);
        assert_eq!(handler.step_names(), vec!["step"]);
        assert_eq!(handler.calls()[0].execution_id, "exec-1");
    }

    #[tokio::test]
    #[should_panic(expected = "kaboom")]
    async fn test_panicking_handler() {
        let _ = PanickingHandler::new("kaboom").run(&action(), &ctx()).await;
    }
}
