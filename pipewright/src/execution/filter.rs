//! List filters for executions.

use super::{Execution, ExecutionStatus};
use crate::store::Page;
use chrono::{DateTime, Utc};

/// Criteria for listing executions. Results are returned newest first.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Require this definition.
    pub definition_id: Option<String>,
    /// Accept any of these statuses (empty = any status).
    pub statuses: Vec<ExecutionStatus>,
    /// Require this branch.
    pub branch: Option<String>,
    /// Require this author.
    pub author: Option<String>,
    /// Started at or after this instant.
    pub started_after: Option<DateTime<Utc>>,
    /// Started strictly before this instant.
    pub started_before: Option<DateTime<Utc>>,
    /// Offset/limit window.
    pub page: Page,
}

impl ExecutionFilter {
    /// Creates a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires a definition.
    #[must_use]
    pub fn for_definition(mut self, definition_id: impl Into<String>) -> Self {
        self.definition_id = Some(definition_id.into());
        self
    }

    /// Adds an accepted status.
    #[must_use]
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Requires a branch.
    #[must_use]
    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Requires an author.
    #[must_use]
    pub fn by_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Requires a start time at or after `instant`.
    #[must_use]
    pub fn started_after(mut self, instant: DateTime<Utc>) -> Self {
        self.started_after = Some(instant);
        self
    }

    /// Requires a start time before `instant`.
    #[must_use]
    pub fn started_before(mut self, instant: DateTime<Utc>) -> Self {
        self.started_before = Some(instant);
        self
    }

    /// Sets the maximum number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.page.limit = Some(limit);
        self
    }

    /// Sets the number of results to skip.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.page.offset = offset;
        self
    }

    /// Returns true if the execution satisfies every criterion.
    #[must_use]
    pub fn matches(&self, execution: &Execution) -> bool {
        if let Some(ref id) = self.definition_id {
            if &execution.definition_id != id {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&execution.status) {
            return false;
        }
        if self.branch.is_some() && execution.branch != self.branch {
            return false;
        }
        if self.author.is_some() && execution.author != self.author {
            return false;
        }
        if self.started_after.is_some_and(|t| execution.started_at < t) {
            return false;
        }
        if self.started_before.is_some_and(|t| execution.started_at >= t) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionKind, DefinitionMeta};
    use crate::execution::ExecutionParams;
    use chrono::Duration;

    fn execution(branch: &str) -> Execution {
        let mut meta = DefinitionMeta::new("ci");
        meta.id = "def-1".to_string();
        Execution::new(
            DefinitionKind::Pipeline,
            &meta,
            ExecutionParams::manual().with_branch(branch).with_author("kim"),
        )
    }

    #[test]
    fn test_matches_fields() {
        let exec = execution("main");

        assert!(ExecutionFilter::new().matches(&exec));
        assert!(ExecutionFilter::new().for_definition("def-1").on_branch("main").matches(&exec));
        assert!(!ExecutionFilter::new().on_branch("dev").matches(&exec));
        assert!(!ExecutionFilter::new().by_author("lee").matches(&exec));
        assert!(!ExecutionFilter::new()
            .with_status(ExecutionStatus::Success)
            .matches(&exec));
    }

    #[test]
    fn test_time_window() {
        let exec = execution("main");
        let before = exec.started_at - Duration::seconds(1);
        let after = exec.started_at + Duration::seconds(1);

        assert!(ExecutionFilter::new().started_after(before).started_before(after).matches(&exec));
        assert!(!ExecutionFilter::new().started_after(after).matches(&exec));
        assert!(!ExecutionFilter::new().started_before(before).matches(&exec));
    }
}
