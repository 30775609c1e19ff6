//! Notification, email and Slack steps.
//!
//! Delivery is a structured log line; the output records what was sent so
//! later steps and callers can inspect it.

use super::{unexpected_action, StepContext, StepHandler, StepOutput};
use crate::definition::StepAction;
use crate::errors::StepExecutionError;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Logs notifications of one kind.
#[derive(Debug, Clone)]
pub struct NotifyHandler {
    kind: String,
}

impl NotifyHandler {
    /// Creates a handler for `notification`, `email` or `slack` steps.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

#[async_trait]
impl StepHandler for NotifyHandler {
    async fn run(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        let (recipient, message) = match action {
            StepAction::Notification { channel, message }
            | StepAction::Slack { channel, message } => (channel.clone(), message.clone()),
            StepAction::Email { to, subject, body } => {
                let message = if body.is_empty() {
                    subject.clone()
                } else {
                    format!("{subject}\n\n{body}")
                };
                (to.join(", "), message)
            }
            other => return Err(unexpected_action(ctx, &self.kind, other)),
        };

        info!(
            execution_id = %ctx.execution_id,
            step = %ctx.step_name,
            kind = %self.kind,
            recipient = %recipient,
            "Notification: {}",
            message
        );

        let mut out = StepOutput::new();
        out.insert("delivered".to_string(), json!(true));
        out.insert("recipient".to_string(), json!(recipient));
        out.insert("message".to_string(), json!(message));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_email_delivery_output() {
        let ctx = StepContext::new("e", "mail", HashMap::new(), Arc::new(CancellationToken::new()));
        let action = StepAction::Email {
            to: vec!["a@x.io".to_string(), "b@x.io".to_string()],
            subject: "Build failed".to_string(),
            body: String::new(),
        };
        let out = NotifyHandler::new("email").run(&action, &ctx).await.unwrap();

        assert_eq!(out["delivered"], true);
        assert_eq!(out["recipient"], "a@x.io, b@x.io");
        assert_eq!(out["message"], "Build failed");
    }
}
