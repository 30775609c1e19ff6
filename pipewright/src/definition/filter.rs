//! List filters for definitions.

use super::{DefinitionMeta, DefinitionStatus};
use crate::store::Page;

/// Criteria for listing pipelines or workflows.
///
/// Every set criterion must match. Results are returned newest first.
#[derive(Debug, Clone, Default)]
pub struct DefinitionFilter {
    /// Accept any of these statuses (empty = any status).
    pub statuses: Vec<DefinitionStatus>,
    /// Require every one of these tags.
    pub tags: Vec<String>,
    /// Require this creator.
    pub created_by: Option<String>,
    /// Case-insensitive substring over name and description.
    pub search: Option<String>,
    /// Offset/limit window.
    pub page: Page,
}

impl DefinitionFilter {
    /// Creates a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an accepted status.
    #[must_use]
    pub fn with_status(mut self, status: DefinitionStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Adds a required tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Requires a creator.
    #[must_use]
    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = Some(actor.into());
        self
    }

    /// Sets the free-text search.
    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
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

    /// Returns true if the definition's metadata satisfies every criterion.
    #[must_use]
    pub fn matches(&self, meta: &DefinitionMeta) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&meta.status) {
            return false;
        }
        if !self.tags.iter().all(|t| meta.tags.contains(t)) {
            return false;
        }
        if let Some(ref actor) = self.created_by {
            if &meta.created_by != actor {
                return false;
            }
        }
        if let Some(ref text) = self.search {
            let needle = text.to_lowercase();
            let in_name = meta.name.to_lowercase().contains(&needle);
            let in_description = meta
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, tags: &[&str], by: &str) -> DefinitionMeta {
        let mut meta = DefinitionMeta::new(name);
        meta.tags = tags.iter().map(ToString::to_string).collect();
        meta.created_by = by.to_string();
        meta
    }

    #[test]
    fn test_empty_filter_matches_all() {
        assert!(DefinitionFilter::new().matches(&meta("a", &[], "x")));
    }

    #[test]
    fn test_tags_all_required() {
        let filter = DefinitionFilter::new().with_tag("rust").with_tag("ci");
        assert!(filter.matches(&meta("a", &["ci", "rust", "nightly"], "x")));
        assert!(!filter.matches(&meta("a", &["rust"], "x")));
    }

    #[test]
    fn test_status_and_creator() {
        let filter = DefinitionFilter::new()
            .with_status(DefinitionStatus::Draft)
            .created_by("alice");
        let mut draft = meta("a", &[], "alice");
        draft.status = DefinitionStatus::Draft;

        assert!(filter.matches(&draft));
        assert!(!filter.matches(&meta("a", &[], "alice")));
        draft.created_by = "bob".to_string();
        assert!(!filter.matches(&draft));
    }

    #[test]
    fn test_search_name_and_description() {
        let filter = DefinitionFilter::new().search("DEPLOY");
        assert!(filter.matches(&meta("Deploy prod", &[], "x")));

        let mut other = meta("release", &[], "x");
        assert!(!filter.matches(&other));
        other.description = Some("runs the deploy scripts".to_string());
        assert!(filter.matches(&other));
    }
}
