//! Step handlers and the registry that dispatches to them.
//!
//! A [`StepAction`] names its handler through [`StepAction::kind`]; the
//! [`HandlerRegistry`] maps that key to an `Arc<dyn StepHandler>`. Built-in
//! handlers cover commands, scripts, HTTP/webhooks (feature `http`),
//! notifications and delays. Anything else is registered by name and reached
//! through `StepAction::Custom`.

mod command;
mod delay;
#[cfg(feature = "http")]
mod http;
mod notify;
mod script;

pub use command::CommandHandler;
pub use delay::DelayHandler;
#[cfg(feature = "http")]
pub use http::{HttpHandler, WebhookHandler};
pub use notify::NotifyHandler;
pub use script::ScriptHandler;

use crate::cancellation::CancellationToken;
use crate::config::EngineConfig;
use crate::definition::StepAction;
use crate::errors::StepExecutionError;
use crate::utils::value_to_string;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Values a handler produces; merged into the execution's variables.
pub type StepOutput = HashMap<String, serde_json::Value>;

/// Everything a handler may read while running one attempt.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The owning execution.
    pub execution_id: String,
    /// The step's name.
    pub step_name: String,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Snapshot of the execution's variables when the step started.
    pub variables: HashMap<String, serde_json::Value>,
    /// The execution's cancellation token.
    pub token: Arc<CancellationToken>,
}

impl StepContext {
    /// Creates a context for the first attempt of a step.
    #[must_use]
    pub fn new(
        execution_id: impl Into<String>,
        step_name: impl Into<String>,
        variables: HashMap<String, serde_json::Value>,
        token: Arc<CancellationToken>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            step_name: step_name.into(),
            attempt: 1,
            variables,
            token,
        }
    }

    /// Returns a copy for another attempt.
    #[must_use]
    pub fn for_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }

    /// Variables exported to child processes as `PIPEWRIGHT_<NAME>`.
    ///
    /// Captured process output and response bodies stay out of the
    /// environment, as does any value longer than [`MAX_ENV_VALUE_BYTES`]:
    /// argv and environment share the kernel's `ARG_MAX`.
    #[must_use]
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = self
            .variables
            .iter()
            .filter(|(k, _)| !is_bulk_key(k))
            .map(|(k, v)| (env_name(k), value_to_string(v)))
            .filter(|(_, v)| v.len() <= MAX_ENV_VALUE_BYTES)
            .collect();
        vars.push(("PIPEWRIGHT_EXECUTION_ID".to_string(), self.execution_id.clone()));
        vars
    }

    /// Builds a step error for this step.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> StepExecutionError {
        StepExecutionError::new(self.step_name.clone(), message)
    }
}

/// Longest variable value exported to a child process environment.
pub const MAX_ENV_VALUE_BYTES: usize = 4096;

/// Output keys holding captured streams or bodies, bare or step-qualified.
const BULK_OUTPUT_KEYS: &[&str] = &["output", "body"];

fn is_bulk_key(key: &str) -> bool {
    let field = key.rsplit_once('.').map_or(key, |(_, field)| field);
    BULK_OUTPUT_KEYS.contains(&field)
}

fn env_name(key: &str) -> String {
    let suffix: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("PIPEWRIGHT_{suffix}")
}

/// Runs one kind of step.
///
/// Handlers receive the action with `${name}` placeholders already filled in.
/// Timeouts, retries and cancellation are applied by the caller.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Runs one attempt of the step.
    async fn run(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError>;
}

/// Maps step type keys to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in handler enabled by the crate features.
    #[must_use]
    pub fn with_builtins(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        registry.register("command", Arc::new(CommandHandler::new(config.shell.clone())));
        registry.register("script", Arc::new(ScriptHandler::new(config.shell.clone())));
        #[cfg(feature = "http")]
        {
            let client = http::build_client(config.http_timeout());
            registry.register("http", Arc::new(HttpHandler::new(client.clone())));
            registry.register("webhook", Arc::new(WebhookHandler::new(client)));
        }
        for kind in ["notification", "email", "slack"] {
            registry.register(kind, Arc::new(NotifyHandler::new(kind)));
        }
        registry.register("delay", Arc::new(DelayHandler));
        registry
    }

    /// Registers (or replaces) the handler for a type key.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Returns true if a handler is registered for the key.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Returns the handler for the key.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Runs one attempt of `action` through its handler.
    pub async fn dispatch(
        &self,
        action: &StepAction,
        ctx: &StepContext,
    ) -> Result<StepOutput, StepExecutionError> {
        let kind = action.kind();
        let handler = self
            .get(kind)
            .ok_or_else(|| ctx.error(format!("no handler registered for step type '{kind}'")))?;
        handler.run(action, ctx).await
    }
}

/// Error for a handler that was given an action of another type.
pub(crate) fn unexpected_action(
    ctx: &StepContext,
    expected: &str,
    action: &StepAction,
) -> StepExecutionError {
    ctx.error(format!(
        "{expected} handler cannot run a '{}' step",
        action.kind()
    ))
}
