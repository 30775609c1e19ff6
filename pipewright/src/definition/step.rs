//! Steps (pipelines) and actions (workflows): the unit of work.

use crate::retry::RetryPolicy;
use crate::utils::interpolate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a step does, tagged by `type`.
///
/// Each variant maps to a handler key in the
/// [`HandlerRegistry`](crate::executor::HandlerRegistry); `Custom` names its
/// handler explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Run a shell command.
    Command {
        /// Command line passed to `<shell> -c`.
        command: String,
        /// Working directory.
        #[serde(default)]
        working_dir: Option<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Write a script to a temp file and run it.
    Script {
        /// Script body.
        script: String,
        /// Interpreter; defaults to the configured shell.
        #[serde(default)]
        interpreter: Option<String>,
    },
    /// Issue an HTTP request.
    Http {
        /// Target URL.
        url: String,
        /// HTTP method.
        #[serde(default = "default_method")]
        method: String,
        /// Request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Request body.
        #[serde(default)]
        body: Option<String>,
        /// Treat statuses outside 2xx/3xx as failures.
        #[serde(default)]
        fail_on_error_status: bool,
    },
    /// POST a JSON payload.
    Webhook {
        /// Target URL.
        url: String,
        /// JSON payload; string leaves are interpolated.
        #[serde(default)]
        payload: serde_json::Value,
        /// Request headers.
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Treat statuses outside 2xx/3xx as failures.
        #[serde(default)]
        fail_on_error_status: bool,
    },
    /// Generic notification.
    Notification {
        /// Destination channel.
        channel: String,
        /// Message text.
        message: String,
    },
    /// Email notification.
    Email {
        /// Recipients.
        to: Vec<String>,
        /// Subject line.
        subject: String,
        /// Body text.
        #[serde(default)]
        body: String,
    },
    /// Slack notification.
    Slack {
        /// Channel name.
        channel: String,
        /// Message text.
        message: String,
    },
    /// Sleep for a fixed time.
    Delay {
        /// Milliseconds to wait.
        millis: u64,
    },
    /// A handler registered by name.
    Custom {
        /// Registered handler name.
        handler: String,
        /// Handler-specific configuration; string leaves are interpolated.
        #[serde(default)]
        config: serde_json::Value,
    },
}

fn default_method() -> String {
    "GET".to_string()
}

impl StepAction {
    /// The handler key this action dispatches to.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Command { .. } => "command",
            Self::Script { .. } => "script",
            Self::Http { .. } => "http",
            Self::Webhook { .. } => "webhook",
            Self::Notification { .. } => "notification",
            Self::Email { .. } => "email",
            Self::Slack { .. } => "slack",
            Self::Delay { .. } => "delay",
            Self::Custom { handler, .. } => handler,
        }
    }

    /// Returns a description of a missing required payload field, if any.
    #[must_use]
    pub fn missing_payload(&self) -> Option<&'static str> {
        match self {
            Self::Command { command, .. } if command.trim().is_empty() => {
                Some("command must not be empty")
            }
            Self::Script { script, .. } if script.trim().is_empty() => {
                Some("script must not be empty")
            }
            Self::Http { url, .. } | Self::Webhook { url, .. } if url.trim().is_empty() => {
                Some("url must not be empty")
            }
            Self::Email { to, .. } if to.is_empty() => Some("email needs at least one recipient"),
            Self::Custom { handler, .. } if handler.trim().is_empty() => {
                Some("custom handler name must not be empty")
            }
            _ => None,
        }
    }

    /// Returns a copy with `${name}` placeholders filled from `variables`.
    #[must_use]
    pub fn render(&self, variables: &HashMap<String, serde_json::Value>) -> Self {
        let s = |v: &str| interpolate(v, variables);
        let map = |m: &HashMap<String, String>| -> HashMap<String, String> {
            m.iter().map(|(k, v)| (k.clone(), s(v))).collect()
        };

        match self {
            Self::Command {
                command,
                working_dir,
                env,
            } => Self::Command {
                command: s(command),
                working_dir: working_dir.as_deref().map(s),
                env: map(env),
            },
            Self::Script {
                script,
                interpreter,
            } => Self::Script {
                script: s(script),
                interpreter: interpreter.clone(),
            },
            Self::Http {
                url,
                method,
                headers,
                body,
                fail_on_error_status,
            } => Self::Http {
                url: s(url),
                method: method.clone(),
                headers: map(headers),
                body: body.as_deref().map(s),
                fail_on_error_status: *fail_on_error_status,
            },
            Self::Webhook {
                url,
                payload,
                headers,
                fail_on_error_status,
            } => Self::Webhook {
                url: s(url),
                payload: render_value(payload, variables),
                headers: map(headers),
                fail_on_error_status: *fail_on_error_status,
            },
            Self::Notification { channel, message } => Self::Notification {
                channel: s(channel),
                message: s(message),
            },
            Self::Email { to, subject, body } => Self::Email {
                to: to.iter().map(|t| s(t)).collect(),
                subject: s(subject),
                body: s(body),
            },
            Self::Slack { channel, message } => Self::Slack {
                channel: s(channel),
                message: s(message),
            },
            Self::Delay { millis } => Self::Delay { millis: *millis },
            Self::Custom { handler, config } => Self::Custom {
                handler: handler.clone(),
                config: render_value(config, variables),
            },
        }
    }
}

fn render_value(
    value: &serde_json::Value,
    variables: &HashMap<String, serde_json::Value>,
) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(interpolate(s, variables)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| render_value(v, variables)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn default_true() -> bool {
    true
}

/// One unit of work inside a job (or, as [`Action`], inside a workflow).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step ID; assigned on create when empty.
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// What to run.
    #[serde(flatten)]
    pub action: StepAction,
    /// Per-attempt timeout in seconds; the engine default applies when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retry policy; no retries when unset.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Keep going when this step fails.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Disabled steps are recorded as skipped.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Workflow actions have exactly the shape of pipeline steps.
pub type Action = Step;

impl Step {
    /// Creates an enabled step with no retries.
    #[must_use]
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            action,
            timeout_secs: None,
            retry: None,
            continue_on_error: false,
            enabled: true,
        }
    }

    /// Creates a shell command step.
    #[must_use]
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(
            name,
            StepAction::Command {
                command: command.into(),
                working_dir: None,
                env: HashMap::new(),
            },
        )
    }

    /// Creates a script step run by the configured shell.
    #[must_use]
    pub fn script(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(
            name,
            StepAction::Script {
                script: script.into(),
                interpreter: None,
            },
        )
    }

    /// Creates a delay step.
    #[must_use]
    pub fn delay(name: impl Into<String>, millis: u64) -> Self {
        Self::new(name, StepAction::Delay { millis })
    }

    /// Creates a step dispatched to a custom handler.
    #[must_use]
    pub fn custom(
        name: impl Into<String>,
        handler: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self::new(
            name,
            StepAction::Custom {
                handler: handler.into(),
                config,
            },
        )
    }

    /// Sets the step ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = Some(seconds);
        self
    }

    /// Lets the owning job continue when this step fails.
    #[must_use]
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Disables the step.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_deserialize_flattened_action() {
        let step: Step = serde_json::from_value(json!({
            "name": "build",
            "type": "command",
            "command": "make",
            "retry": {"max_retries": 2}
        }))
        .unwrap();

        assert_eq!(step.action.kind(), "command");
        assert!(step.enabled);
        assert_eq!(step.retry.unwrap().max_retries, 2);
    }

    #[test]
    fn test_unknown_type_is_rejected_by_serde() {
        let result: Result<Step, _> = serde_json::from_value(json!({
            "name": "x",
            "type": "teleport"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_kind_is_handler_name() {
        let step = Step::custom("lint", "clippy", json!({}));
        assert_eq!(step.action.kind(), "clippy");
    }

    #[test]
    fn test_missing_payload() {
        assert_eq!(
            Step::command("x", "  ").action.missing_payload(),
            Some("command must not be empty")
        );
        assert!(Step::command("x", "true").action.missing_payload().is_none());
    }

    #[test]
    fn test_render_command_and_webhook() {
        let mut vars = HashMap::new();
        vars.insert("branch".to_string(), json!("main"));
        vars.insert("sha".to_string(), json!("abc123"));

        let rendered = Step::command("c", "git checkout ${branch}").action.render(&vars);
        assert_eq!(
            rendered,
            StepAction::Command {
                command: "git checkout main".to_string(),
                working_dir: None,
                env: HashMap::new(),
            }
        );

        let hook = StepAction::Webhook {
            url: "https://ci/${branch}".to_string(),
            payload: json!({"commit": "${sha}", "n": 1, "list": ["${branch}"]}),
            headers: HashMap::new(),
            fail_on_error_status: false,
        };
        match hook.render(&vars) {
            StepAction::Webhook { url, payload, .. } => {
                assert_eq!(url, "https://ci/main");
                assert_eq!(payload, json!({"commit": "abc123", "n": 1, "list": ["main"]}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
