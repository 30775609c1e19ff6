//! Execution parameters and trigger sources.

use crate::definition::TriggerType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// What caused an execution to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// A direct `execute` call.
    #[default]
    Manual,
    /// A push event.
    Push,
    /// A pull request event.
    PullRequest,
    /// A tag event.
    Tag,
    /// A generic event.
    Event,
    /// A webhook.
    Webhook,
    /// A retry of an earlier execution.
    Retry,
}

impl From<TriggerType> for TriggerSource {
    fn from(value: TriggerType) -> Self {
        match value {
            TriggerType::Push => Self::Push,
            TriggerType::PullRequest => Self::PullRequest,
            TriggerType::Tag => Self::Tag,
            TriggerType::Event => Self::Event,
            TriggerType::Webhook => Self::Webhook,
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::Tag => "tag",
            Self::Event => "event",
            Self::Webhook => "webhook",
            Self::Retry => "retry",
        };
        f.write_str(s)
    }
}

/// Inputs for one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Source branch.
    #[serde(default)]
    pub branch: Option<String>,
    /// Commit SHA.
    #[serde(default)]
    pub commit: Option<String>,
    /// Who caused the run.
    #[serde(default)]
    pub author: Option<String>,
    /// Variables layered over the definition's own.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// What caused the run.
    #[serde(default)]
    pub trigger: TriggerSource,
}

impl ExecutionParams {
    /// Parameters for a manual run.
    #[must_use]
    pub fn manual() -> Self {
        Self::default()
    }

    /// Sets the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the commit.
    #[must_use]
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Adds a variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Sets the trigger source.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerSource) -> Self {
        self.trigger = trigger;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_builder() {
        let params = ExecutionParams::manual()
            .with_branch("main")
            .with_commit("abc")
            .with_author("dana")
            .with_variable("n", serde_json::json!(3));

        assert_eq!(params.branch.as_deref(), Some("main"));
        assert_eq!(params.trigger, TriggerSource::Manual);
        assert_eq!(params.variables["n"], 3);
    }

    #[test]
    fn test_trigger_source_from_type() {
        assert_eq!(TriggerSource::from(TriggerType::PullRequest), TriggerSource::PullRequest);
        assert_eq!(TriggerSource::Retry.to_string(), "retry");
    }
}
