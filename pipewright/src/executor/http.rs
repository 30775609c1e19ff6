//! HTTP and webhook steps.

use super::{unexpected_action, StepContext, StepHandler, StepOutput};
use crate::definition::StepAction;
use crate::errors::StepExecutionError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Builds the client shared by the HTTP and webhook handlers.
pub(super) fn build_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build configured HTTP client, using defaults");
        Client::new()
    })
}

fn with_headers(mut request: RequestBuilder, headers: &HashMap<String, String>) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(name, value);
    }
    request
}

async fn send(
    request: RequestBuilder,
    fail_on_error_status: bool,
    ctx: &StepContext,
) -> Result<StepOutput, StepExecutionError> {
    let response = request
        .send()
        .await
        .map_err(|e| ctx.error(format!("request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ctx.error(format!("failed to read response body: {e}")))?;

    debug!(
        execution_id = %ctx.execution_id,
        step = %ctx.step_name,
        status = status.as_u16(),
        "HTTP step finished"
    );

    if fail_on_error_status && !(status.is_success() || status.is_redirection()) {
        return Err(ctx
            .error(format!("unexpected HTTP status {}", status.as_u16()))
            .with_output(body));
    }

    let mut out = StepOutput::new();
    out.insert("status_code".to_string(), json!(status.as_u16()));
    out.insert("body".to_string(), json!(body));
    Ok(out)
}

/// Issues arbitrary HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Client,
}

impl HttpHandler {
    /// Creates a handler around a client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepHandler for HttpHandler {
    async fn run(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        let StepAction::Http {
            url,
            method,
            headers,
            body,
            fail_on_error_status,
        } = action
        else {
            return Err(unexpected_action(ctx, "http", action));
        };

        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| ctx.error(format!("invalid HTTP method '{method}'")))?;

        let mut request = with_headers(self.client.request(method, url), headers);
        if let Some(body) = body {
            request = request.body(body.clone());
        }
        send(request, *fail_on_error_status, ctx).await
    }
}

/// POSTs JSON payloads.
#[derive(Debug, Clone)]
pub struct WebhookHandler {
    client: Client,
}

impl WebhookHandler {
    /// Creates a handler around a client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepHandler for WebhookHandler {
    async fn run(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        let StepAction::Webhook {
            url,
            payload,
            headers,
            fail_on_error_status,
        } = action
        else {
            return Err(unexpected_action(ctx, "webhook", action));
        };

        let request = with_headers(self.client.post(url), headers).json(payload);
        send(request, *fail_on_error_status, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use std::sync::Arc;

    fn ctx() -> StepContext {
        StepContext::new("e", "call", HashMap::new(), Arc::new(CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_invalid_method() {
        let handler = HttpHandler::new(Client::new());
        let action = StepAction::Http {
            url: "http://127.0.0.1:9".to_string(),
            method: "NOT A METHOD".to_string(),
            headers: HashMap::new(),
            body: None,
            fail_on_error_status: false,
        };
        let err = handler.run(&action, &ctx()).await.unwrap_err();
        assert!(err.message.contains("invalid HTTP method"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_step_error() {
        let handler = WebhookHandler::new(build_client(Duration::from_secs(2)));
        let action = StepAction::Webhook {
            url: "http://127.0.0.1:9/hook".to_string(),
            payload: json!({"ok": true}),
            headers: HashMap::new(),
            fail_on_error_status: true,
        };
        let err = handler.run(&action, &ctx()).await.unwrap_err();
        assert!(err.message.starts_with("request failed"));
    }
}
