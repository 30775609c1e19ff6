//! Trigger rule evaluation.

use super::{Event, EventEnvelope};
use crate::definition::{Trigger, TriggerType};
use crate::execution::{ExecutionParams, TriggerSource};

/// Returns true if the trigger is enabled, listens for this event type, and
/// every configured filter passes.
#[must_use]
pub fn trigger_matches(trigger: &Trigger, envelope: &EventEnvelope) -> bool {
    trigger.enabled
        && type_matches(trigger, &envelope.event_type)
        && branch_matches(&trigger.branches, envelope.branch.as_deref())
        && path_matches(&trigger.paths, &envelope.paths)
        && tag_matches(&trigger.tags, envelope.tag.as_deref())
}

fn type_matches(trigger: &Trigger, event_type: &str) -> bool {
    let listed = || trigger.events.iter().any(|e| e == event_type);
    match trigger.trigger_type {
        TriggerType::Push => event_type == "push",
        TriggerType::PullRequest => event_type == "pull_request",
        TriggerType::Tag => matches!(event_type, "tag" | "tag_created"),
        TriggerType::Event => listed(),
        TriggerType::Webhook => event_type == "webhook" || listed(),
    }
}

/// Empty filters pass. A pattern ending in `*` matches by prefix.
fn branch_matches(patterns: &[String], branch: Option<&str>) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let Some(branch) = branch else {
        return false;
    };
    patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => branch.starts_with(prefix),
        None => pattern == branch,
    })
}

fn path_matches(prefixes: &[String], paths: &[String]) -> bool {
    prefixes.is_empty()
        || paths
            .iter()
            .any(|path| prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())))
}

fn tag_matches(tags: &[String], tag: Option<&str>) -> bool {
    tags.is_empty() || tag.is_some_and(|t| tags.iter().any(|candidate| candidate == t))
}

/// Builds the parameters for an execution spawned by `trigger` for `event`.
///
/// `branch`, `commit` and `author` come from the payload (author falls back
/// to the event's user); the whole payload becomes the run's variables.
#[must_use]
pub fn params_from_event(
    event: &Event,
    envelope: &EventEnvelope,
    trigger: &Trigger,
) -> ExecutionParams {
    ExecutionParams {
        branch: envelope.branch.clone(),
        commit: event.data_str("commit").map(ToString::to_string),
        author: event
            .data_str("author")
            .map(ToString::to_string)
            .or_else(|| event.user_id.clone()),
        variables: event.data.clone(),
        trigger: TriggerSource::from(trigger.trigger_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_main_matches_main_develop_only() {
        let envelope = EventEnvelope::new("push").with_branch("main");

        assert!(trigger_matches(&Trigger::push(["main", "develop"]), &envelope));
        assert!(!trigger_matches(&Trigger::push(["release"]), &envelope));
    }

    #[test]
    fn test_type_mapping() {
        let pr = EventEnvelope::new("pull_request");
        assert!(trigger_matches(&Trigger::new(TriggerType::PullRequest), &pr));
        assert!(!trigger_matches(&Trigger::new(TriggerType::Push), &pr));

        let tag_created = EventEnvelope::new("tag_created").with_tag("v1");
        assert!(trigger_matches(&Trigger::new(TriggerType::Tag), &tag_created));
        assert!(trigger_matches(&Trigger::new(TriggerType::Tag), &EventEnvelope::new("tag")));

        let deploy = EventEnvelope::new("deploy");
        assert!(!trigger_matches(&Trigger::new(TriggerType::Event), &deploy));
        assert!(trigger_matches(
            &Trigger::new(TriggerType::Event).with_events(["deploy"]),
            &deploy
        ));

        assert!(trigger_matches(
            &Trigger::new(TriggerType::Webhook),
            &EventEnvelope::new("webhook")
        ));
        assert!(trigger_matches(
            &Trigger::new(TriggerType::Webhook).with_events(["deploy"]),
            &deploy
        ));
    }

    #[test]
    fn test_disabled_never_matches() {
        let envelope = EventEnvelope::new("push").with_branch("main");
        assert!(!trigger_matches(&Trigger::push(["main"]).disabled(), &envelope));
    }

    #[test]
    fn test_branch_wildcard_and_missing_branch() {
        let trigger = Trigger::push(["release/*"]);
        assert!(trigger_matches(&trigger, &EventEnvelope::new("push").with_branch("release/1.0")));
        assert!(!trigger_matches(&trigger, &EventEnvelope::new("push").with_branch("main")));
        assert!(!trigger_matches(&trigger, &EventEnvelope::new("push")));
        assert!(trigger_matches(&Trigger::new(TriggerType::Push), &EventEnvelope::new("push")));
    }

    #[test]
    fn test_path_filter() {
        let trigger = Trigger::push(Vec::<String>::new()).with_paths(["src/", "Cargo.toml"]);
        let touching_src = EventEnvelope::new("push").with_paths(["docs/x.md", "src/main.rs"]);
        let docs_only = EventEnvelope::new("push").with_paths(["docs/x.md"]);

        assert!(trigger_matches(&trigger, &touching_src));
        assert!(!trigger_matches(&trigger, &docs_only));
        assert!(!trigger_matches(&trigger, &EventEnvelope::new("push")));
    }

    #[test]
    fn test_tag_filter() {
        let trigger = Trigger::new(TriggerType::Tag).with_tags(["v1.0", "v2.0"]);
        assert!(trigger_matches(&trigger, &EventEnvelope::new("tag").with_tag("v2.0")));
        assert!(!trigger_matches(&trigger, &EventEnvelope::new("tag").with_tag("v3.0")));
        assert!(!trigger_matches(&trigger, &EventEnvelope::new("tag")));
    }

    #[test]
    fn test_params_from_event() {
        let event = Event::push("main")
            .with_data("commit", json!("abc123"))
            .with_user("u-7");
        let envelope = EventEnvelope::from(&event);
        let params = params_from_event(&event, &envelope, &Trigger::push(["main"]));

        assert_eq!(params.branch.as_deref(), Some("main"));
        assert_eq!(params.commit.as_deref(), Some("abc123"));
        assert_eq!(params.author.as_deref(), Some("u-7"));
        assert_eq!(params.trigger, TriggerSource::Push);
        assert_eq!(params.variables["commit"], "abc123");

        let with_author = event.clone().with_data("author", json!("sam"));
        let params = params_from_event(&with_author, &envelope, &Trigger::push(["main"]));
        assert_eq!(params.author.as_deref(), Some("sam"));
    }
}
