//! Inbound events and the envelope the matcher evaluates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An external event such as a push or a pull request.
///
/// Events are evaluated against registered triggers and then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `push`, `pull_request`, `tag_created`, `deploy`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Where the event came from.
    #[serde(default)]
    pub source: String,
    /// What the event is about.
    #[serde(default)]
    pub subject: Option<String>,
    /// Free-form payload. `branch`, `ref`, `commit`, `author`, `tag` and
    /// `paths` are interpreted.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    /// When the event happened.
    #[serde(default = "crate::utils::now")]
    pub timestamp: DateTime<Utc>,
    /// Who caused the event.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Event {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: String::new(),
            subject: None,
            data: HashMap::new(),
            timestamp: crate::utils::now(),
            user_id: None,
        }
    }

    /// Creates a push event for a branch.
    #[must_use]
    pub fn push(branch: impl Into<String>) -> Self {
        Self::new("push").with_data("branch", serde_json::Value::String(branch.into()))
    }

    /// Adds a payload entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns a payload entry as a string.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }
}

/// The parts of an event that trigger rules look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Event type.
    pub event_type: String,
    /// Branch name, without any `refs/heads/` prefix.
    pub branch: Option<String>,
    /// Changed paths.
    pub paths: Vec<String>,
    /// Tag name, without any `refs/tags/` prefix.
    pub tag: Option<String>,
}

impl EventEnvelope {
    /// Creates an envelope with only a type.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    /// Sets the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the changed paths.
    #[must_use]
    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

impl From<&Event> for EventEnvelope {
    fn from(event: &Event) -> Self {
        let git_ref = event.data_str("ref");

        let branch = event
            .data_str("branch")
            .map(ToString::to_string)
            .or_else(|| {
                git_ref
                    .and_then(|r| r.strip_prefix("refs/heads/"))
                    .map(ToString::to_string)
            });

        let tag = event
            .data_str("tag")
            .map(ToString::to_string)
            .or_else(|| {
                git_ref
                    .and_then(|r| r.strip_prefix("refs/tags/"))
                    .map(ToString::to_string)
            });

        let paths = event
            .data
            .get("paths")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            event_type: event.event_type.clone(),
            branch,
            paths,
            tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_from_branch_and_paths() {
        let event = Event::push("main").with_data("paths", json!(["src/lib.rs", 3, "docs/a.md"]));
        let envelope = EventEnvelope::from(&event);

        assert_eq!(envelope.event_type, "push");
        assert_eq!(envelope.branch.as_deref(), Some("main"));
        assert_eq!(envelope.paths, vec!["src/lib.rs", "docs/a.md"]);
        assert!(envelope.tag.is_none());
    }

    #[test]
    fn test_envelope_from_git_refs() {
        let push = Event::new("push").with_data("ref", json!("refs/heads/feature/x"));
        assert_eq!(EventEnvelope::from(&push).branch.as_deref(), Some("feature/x"));

        let tag = Event::new("tag_created").with_data("ref", json!("refs/tags/v1.2.0"));
        assert_eq!(EventEnvelope::from(&tag).tag.as_deref(), Some("v1.2.0"));
    }

    #[test]
    fn test_event_deserialize() {
        let event: Event = serde_json::from_str(
            r#"{"type": "pull_request", "source": "github",
                "data": {"branch": "dev"}, "user_id": "u1"}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, "pull_request");
        assert_eq!(event.data_str("branch"), Some("dev"));
        assert_eq!(event.user_id.as_deref(), Some("u1"));
    }
}
