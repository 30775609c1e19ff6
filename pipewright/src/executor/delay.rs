//! Delay steps.

use super::{unexpected_action, StepContext, StepHandler, StepOutput};
use crate::definition::StepAction;
use crate::errors::StepExecutionError;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Sleeps for the configured number of milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayHandler;

#[async_trait]
impl StepHandler for DelayHandler {
    async fn run(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        let StepAction::Delay { millis } = action else {
            return Err(unexpected_action(ctx, "delay", action));
        };
        tokio::time::sleep(Duration::from_millis(*millis)).await;

        let mut out = StepOutput::new();
        out.insert("waited_ms".to_string(), json!(millis));
        Ok(out)
    }
}
