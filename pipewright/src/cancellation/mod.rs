//! Cooperative cancellation of running executions.
//!
//! Each queued execution gets a [`CancellationToken`] registered in a
//! [`TokenRegistry`]. Cancelling an execution flips its token; the owning
//! worker observes the flag before starting the next unit of work.

mod token;

pub use token::{CancelRequest, CancellationToken};

use dashmap::DashMap;
use std::sync::Arc;

/// Live tokens keyed by execution ID.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: DashMap<String, Arc<CancellationToken>>,
}

impl TokenRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a token for an execution.
    pub fn register(&self, execution_id: &str) -> Arc<CancellationToken> {
        let token = Arc::new(CancellationToken::new());
        self.tokens.insert(execution_id.to_string(), token.clone());
        token
    }

    /// Cancels the execution's token, if it is still registered.
    ///
    /// Returns true if a live token was found.
    pub fn cancel(&self, execution_id: &str, reason: &str) -> bool {
        match self.tokens.get(execution_id) {
            Some(token) => {
                token.cancel(reason);
                true
            }
            None => false,
        }
    }

    /// Returns the execution's token.
    #[must_use]
    pub fn get(&self, execution_id: &str) -> Option<Arc<CancellationToken>> {
        self.tokens.get(execution_id).map(|t| t.value().clone())
    }

    /// Returns true while a worker (or the queue) still holds the execution.
    #[must_use]
    pub fn is_live(&self, execution_id: &str) -> bool {
        self.tokens.contains_key(execution_id)
    }

    /// Drops the execution's token once no worker can observe it any more.
    pub fn release(&self, execution_id: &str) {
        self.tokens.remove(execution_id);
    }

    /// Number of live tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no tokens are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_cancel_release() {
        let registry = TokenRegistry::new();
        let token = registry.register("exec-1");

        assert!(registry.is_live("exec-1"));
        assert!(registry.cancel("exec-1", "user"));
        assert!(token.is_cancelled());

        registry.release("exec-1");
        assert!(!registry.is_live("exec-1"));
        assert!(!registry.cancel("exec-1", "again"));
        assert!(registry.is_empty());
    }
}
