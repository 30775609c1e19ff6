//! Shape checks shared by pipelines and workflows.

use super::{DefinitionMeta, Step};
use crate::errors::ValidationError;
use crate::executor::HandlerRegistry;

/// Validates the fields every definition carries.
pub fn validate_meta(meta: &DefinitionMeta) -> Result<(), ValidationError> {
    if meta.name.trim().is_empty() {
        return Err(ValidationError::new("name is required").at("name"));
    }
    for (i, trigger) in meta.triggers.iter().enumerate() {
        if matches!(
            trigger.trigger_type,
            super::TriggerType::Event | super::TriggerType::Webhook
        ) && trigger.events.iter().any(|e| e.trim().is_empty())
        {
            return Err(ValidationError::new("event names must not be blank")
                .at(format!("triggers[{i}].events")));
        }
    }
    Ok(())
}

/// Validates one step (or workflow action) found at `path`.
pub fn validate_step(
    step: &Step,
    path: &str,
    handlers: &HandlerRegistry,
) -> Result<(), ValidationError> {
    if step.name.trim().is_empty() {
        return Err(ValidationError::new("step name is required").at(path));
    }

    if let Some(problem) = step.action.missing_payload() {
        return Err(ValidationError::new(problem).at(path));
    }

    let kind = step.action.kind();
    if !handlers.contains(kind) {
        return Err(ValidationError::new(format!("step type '{kind}' is not registered")).at(path));
    }

    if let Some(ref retry) = step.retry {
        if !retry.backoff_factor.is_finite() || retry.backoff_factor < 0.0 {
            return Err(ValidationError::new(format!(
                "retry backoff_factor must be a non-negative number, got {}",
                retry.backoff_factor
            ))
            .at(format!("{path}.retry")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::definition::{Trigger, TriggerType};
    use crate::retry::RetryPolicy;
    use serde_json::json;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::with_builtins(&EngineConfig::default())
    }

    #[test]
    fn test_meta_requires_name() {
        let err = validate_meta(&DefinitionMeta::new("  ")).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("name"));
    }

    #[test]
    fn test_meta_rejects_blank_event_name() {
        let mut meta = DefinitionMeta::new("ok");
        meta.triggers
            .push(Trigger::new(TriggerType::Event).with_events(["deploy", ""]));
        let err = validate_meta(&meta).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("triggers[0].events"));
    }

    #[test]
    fn test_step_unknown_custom_handler() {
        let step = Step::custom("lint", "does-not-exist", json!({}));
        let err = validate_step(&step, "actions[0]", &registry()).unwrap_err();
        assert!(err.message.contains("does-not-exist"));
        assert_eq!(err.path.as_deref(), Some("actions[0]"));
    }

    #[test]
    fn test_step_blank_command() {
        let err = validate_step(&Step::command("build", ""), "s", &registry()).unwrap_err();
        assert_eq!(err.message, "command must not be empty");
    }

    #[test]
    fn test_step_bad_backoff() {
        let step = Step::command("build", "make")
            .with_retry(RetryPolicy::new(2).with_backoff_factor(f64::NAN));
        let err = validate_step(&step, "s", &registry()).unwrap_err();
        assert_eq!(err.path.as_deref(), Some("s.retry"));
    }

    #[test]
    fn test_step_valid() {
        assert!(validate_step(&Step::command("build", "make"), "s", &registry()).is_ok());
        assert!(validate_step(&Step::delay("wait", 10), "s", &registry()).is_ok());
    }
}
