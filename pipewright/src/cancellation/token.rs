//! Per-execution cancel flag.

use chrono::{DateTime, Utc};
use std::sync::OnceLock;

/// Who asked an execution to stop, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    /// Free-form reason recorded on the execution.
    pub reason: String,
    /// When the request reached the token.
    pub requested_at: DateTime<Utc>,
}

/// Flag a worker consults between stages, jobs, steps and retry attempts.
///
/// A step already in flight runs to completion. The token can be set once;
/// later requests leave the first one in place.
#[derive(Debug, Default)]
pub struct CancellationToken {
    request: OnceLock<CancelRequest>,
}

impl CancellationToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the execution to stop. Returns false if it was already asked.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.request
            .set(CancelRequest {
                reason: reason.into(),
                requested_at: Utc::now(),
            })
            .is_ok()
    }

    /// True once any stop request has landed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.request.get().is_some()
    }

    /// The first stop request, if any.
    #[must_use]
    pub fn request(&self) -> Option<&CancelRequest> {
        self.request.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_token_lets_work_continue() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.request().is_none());
    }

    #[test]
    fn test_operator_stop_is_recorded() {
        let before = Utc::now();
        let token = CancellationToken::new();
        assert!(token.cancel("stopped by operator"));

        let request = token.request().unwrap();
        assert!(token.is_cancelled());
        assert_eq!(request.reason, "stopped by operator");
        assert!(request.requested_at >= before);
    }

    #[test]
    fn test_run_timeout_does_not_overwrite_operator_stop() {
        let token = CancellationToken::new();
        assert!(token.cancel("stopped by operator"));
        assert!(!token.cancel("timeout"));
        assert_eq!(token.request().unwrap().reason, "stopped by operator");
    }
}
