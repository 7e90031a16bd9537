//! Cooperative cancellation for async network operations.
//!
//! A `CancellationToken` can be cloned and shared across tasks; cancelling
//! any clone is observed by all clones. An *attempt token* created with
//! [`CancellationToken::attempt`] observes its parent's cancellation but
//! cancels independently: timing out one network attempt must not tear down
//! the retry session that owns it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token for cooperative cancellation of async operations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    /// Create a new root cancellation token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: None,
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token observe the cancellation. A parent token,
    /// if any, is unaffected.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested on this token or any of
    /// its ancestors.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        self.parent
            .as_ref()
            .map(|p| p.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Check whether cancellation originated on an ancestor rather than on
    /// this token itself. Used to distinguish caller-initiated abandonment
    /// from an internally generated per-attempt timeout.
    pub fn parent_cancelled(&self) -> bool {
        self.parent
            .as_ref()
            .map(|p| p.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Create an attempt-scoped token.
    ///
    /// The child observes this token's cancellation, but cancelling the
    /// child leaves this token untouched.
    pub fn attempt(&self) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(self.cancelled.clone()),
        }
    }

    /// Check cancellation and return an error if cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancelledError {}

impl From<CancelledError> for crate::error::NetError {
    fn from(_: CancelledError) -> Self {
        crate::error::NetError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.check().is_err());
    }

    #[test]
    fn test_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();

        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_attempt_cancel_does_not_propagate_up() {
        let session = CancellationToken::new();
        let attempt = session.attempt();

        attempt.cancel();

        assert!(attempt.is_cancelled());
        assert!(!session.is_cancelled());
        assert!(!attempt.parent_cancelled());
    }

    #[test]
    fn test_session_cancel_propagates_down() {
        let session = CancellationToken::new();
        let attempt = session.attempt();

        session.cancel();

        assert!(attempt.is_cancelled());
        assert!(attempt.parent_cancelled());
    }

    #[test]
    fn test_fresh_attempt_after_cancelled_attempt() {
        let session = CancellationToken::new();
        let first = session.attempt();
        first.cancel();

        let second = session.attempt();
        assert!(!second.is_cancelled());
    }
}
