//! Error types for the sync engine.

use ledger_core::CoreError;
use ledger_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Malformed, conflicting and stale delta entries are not errors; the
/// applier counts them in [`crate::ApplyStats`] and carries on.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A payload could not be decoded as a whole.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local storage error during sync.
    #[error("database error: {0}")]
    Core(#[from] CoreError),

    /// The server did not grant a new key lease.
    #[error("key lease renewal failed: {message}")]
    LeaseRenewalFailed {
        /// Error message.
        message: String,
    },

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A request did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a lease renewal failure.
    pub fn lease_renewal_failed(message: impl Into<String>) -> Self {
        Self::LeaseRenewalFailed {
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("bad request").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::lease_renewal_failed("denied").is_retryable());
        assert!(!SyncError::Core(CoreError::OutOfKeys).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::lease_renewal_failed("server refused");
        assert_eq!(err.to_string(), "key lease renewal failed: server refused");

        let err = SyncError::from(ProtocolError::MissingField("anchor"));
        assert!(err.to_string().contains("anchor"));
    }
}
