//! Event triggers attached to definitions.

use serde::{Deserialize, Serialize};

/// The kind of event a trigger listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Branch pushes.
    Push,
    /// Pull request activity.
    PullRequest,
    /// Tag creation.
    Tag,
    /// Generic named events.
    Event,
    /// Inbound webhooks.
    Webhook,
}

impl TriggerType {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::Tag => "tag",
            Self::Event => "event",
            Self::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// A rule that auto-invokes its definition when a matching event arrives.
///
/// Empty filter lists are not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger ID; assigned on registration when empty.
    #[serde(default)]
    pub id: String,
    /// Event kind.
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    /// Branch names; a trailing `*` matches a prefix.
    #[serde(default)]
    pub branches: Vec<String>,
    /// Path prefixes.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Tag names.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Event type names for `event`/`webhook` triggers.
    #[serde(default)]
    pub events: Vec<String>,
    /// Disabled triggers never match.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Trigger {
    /// Creates an enabled trigger with no filters.
    #[must_use]
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            id: String::new(),
            trigger_type,
            branches: Vec::new(),
            paths: Vec::new(),
            tags: Vec::new(),
            events: Vec::new(),
            enabled: true,
        }
    }

    /// Creates a push trigger limited to the given branches.
    #[must_use]
    pub fn push<I, S>(branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(TriggerType::Push).with_branches(branches)
    }

    /// Sets the branch filter.
    #[must_use]
    pub fn with_branches<I, S>(mut self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.branches = branches.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the path filter.
    #[must_use]
    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tag filter.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the event names.
    #[must_use]
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the trigger ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Disables the trigger.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_deserialize() {
        let trigger: Trigger = serde_json::from_str(
            r#"{"type": "pull_request", "branches": ["main"]}"#,
        )
        .unwrap();

        assert_eq!(trigger.trigger_type, TriggerType::PullRequest);
        assert_eq!(trigger.branches, vec!["main"]);
        assert!(trigger.enabled);
        assert!(trigger.id.is_empty());
    }

    #[test]
    fn test_push_builder() {
        let trigger = Trigger::push(["main", "release/*"]).with_paths(["src/"]);
        assert_eq!(trigger.trigger_type.to_string(), "push");
        assert_eq!(trigger.branches.len(), 2);
        assert_eq!(trigger.paths, vec!["src/"]);
    }
}
