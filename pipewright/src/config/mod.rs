//! Engine configuration.
//!
//! `EngineConfig` can be built in code, deserialized from JSON, or read from
//! `PIPEWRIGHT_*` environment variables. Unset fields fall back to defaults.

use crate::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of long-lived workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Capacity of the shared execution queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Timeout applied to definitions that do not declare one, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Per-attempt timeout for steps that do not declare one, in seconds.
    #[serde(default = "default_step_timeout_secs")]
    pub default_step_timeout_secs: u64,
    /// Largest artifact accepted by uploads, in bytes.
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
    /// Shell used to run command steps (`<shell> -c <command>`).
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Timeout for HTTP and webhook steps, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_step_timeout_secs() -> u64 {
    600
}

fn default_max_artifact_bytes() -> u64 {
    64 * 1024 * 1024 // 64MB
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            default_timeout_secs: default_timeout_secs(),
            default_step_timeout_secs: default_step_timeout_secs(),
            max_artifact_bytes: default_max_artifact_bytes(),
            shell: default_shell(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads configuration from the environment.
    ///
    /// Recognized variables:
    /// - `PIPEWRIGHT_WORKERS` (default: 4)
    /// - `PIPEWRIGHT_QUEUE_CAPACITY` (default: 100)
    /// - `PIPEWRIGHT_DEFAULT_TIMEOUT_SECS` (default: 3600)
    /// - `PIPEWRIGHT_STEP_TIMEOUT_SECS` (default: 600)
    /// - `PIPEWRIGHT_MAX_ARTIFACT_BYTES` (default: 64MB)
    /// - `PIPEWRIGHT_SHELL` (default: sh)
    /// - `PIPEWRIGHT_HTTP_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            worker_count: parse_var(&lookup, "PIPEWRIGHT_WORKERS")?
                .unwrap_or(defaults.worker_count),
            queue_capacity: parse_var(&lookup, "PIPEWRIGHT_QUEUE_CAPACITY")?
                .unwrap_or(defaults.queue_capacity),
            default_timeout_secs: parse_var(&lookup, "PIPEWRIGHT_DEFAULT_TIMEOUT_SECS")?
                .unwrap_or(defaults.default_timeout_secs),
            default_step_timeout_secs: parse_var(&lookup, "PIPEWRIGHT_STEP_TIMEOUT_SECS")?
                .unwrap_or(defaults.default_step_timeout_secs),
            max_artifact_bytes: parse_var(&lookup, "PIPEWRIGHT_MAX_ARTIFACT_BYTES")?
                .unwrap_or(defaults.max_artifact_bytes),
            shell: lookup("PIPEWRIGHT_SHELL").unwrap_or(defaults.shell),
            http_timeout_secs: parse_var(&lookup, "PIPEWRIGHT_HTTP_TIMEOUT_SECS")?
                .unwrap_or(defaults.http_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the default definition timeout.
    #[must_use]
    pub fn with_default_timeout_secs(mut self, seconds: u64) -> Self {
        self.default_timeout_secs = seconds;
        self
    }

    /// Sets the default step timeout.
    #[must_use]
    pub fn with_default_step_timeout_secs(mut self, seconds: u64) -> Self {
        self.default_step_timeout_secs = seconds;
        self
    }

    /// Sets the artifact size limit.
    #[must_use]
    pub fn with_max_artifact_bytes(mut self, bytes: u64) -> Self {
        self.max_artifact_bytes = bytes;
        self
    }

    /// Sets the shell used by command steps.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Checks that the configuration can drive an engine.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(EngineError::Config("worker_count must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.shell.trim().is_empty() {
            return Err(EngineError::Config("shell must not be empty".to_string()));
        }
        Ok(())
    }

    /// Default definition timeout as a `Duration`.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Default step timeout as a `Duration`.
    #[must_use]
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.default_step_timeout_secs)
    }

    /// HTTP step timeout as a `Duration`.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::Config(format!("{key} has invalid value '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.shell, "sh");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("PIPEWRIGHT_WORKERS", "8"),
            ("PIPEWRIGHT_QUEUE_CAPACITY", " 16 "),
            ("PIPEWRIGHT_SHELL", "bash"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.shell, "bash");
        assert_eq!(config.default_timeout_secs, 3600);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = EngineConfig::from_lookup(|k| {
            (k == "PIPEWRIGHT_WORKERS").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("PIPEWRIGHT_WORKERS"));
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"worker_count": 2}"#).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.queue_capacity, 100);
    }

    #[test]
    fn test_validate_zero_capacity() {
        let config = EngineConfig::new().with_queue_capacity(0);
        assert!(config.validate().is_err());
    }
}
