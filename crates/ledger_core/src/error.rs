//! Error types for the ledger core.

use ledger_store::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ledger core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An argument is outside its valid range.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// A lookup that requires presence found nothing.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// The key lease is exhausted.
    #[error("key lease exhausted")]
    OutOfKeys,

    /// An operation of a batch failed; nothing of the batch was committed.
    #[error("batch operation {index} failed: {source}")]
    BatchFailed {
        /// Position of the failing operation in the batch.
        index: usize,
        /// The failure.
        #[source]
        source: Box<CoreError>,
    },

    /// The persisted snapshot cannot be used.
    #[error("invalid snapshot: {message}")]
    Snapshot {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Wraps the failure of operation `index` of a batch.
    pub fn batch_failed(index: usize, source: CoreError) -> Self {
        Self::BatchFailed {
            index,
            source: Box::new(source),
        }
    }

    /// Returns true if the error, or the batch failure it wraps, is
    /// [`CoreError::OutOfKeys`].
    pub fn is_out_of_keys(&self) -> bool {
        match self {
            Self::OutOfKeys => true,
            Self::BatchFailed { source, .. } => source.is_out_of_keys(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::Table;

    #[test]
    fn batch_failed_names_index_and_cause() {
        let err = CoreError::batch_failed(
            2,
            CoreError::Store(StoreError::Conflict {
                table: Table::Categories,
                row: 5,
            }),
        );
        assert_eq!(
            err.to_string(),
            "batch operation 2 failed: store error: row 5 already exists in categories"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn out_of_keys_is_seen_through_batches() {
        assert!(CoreError::OutOfKeys.is_out_of_keys());
        assert!(CoreError::batch_failed(0, CoreError::OutOfKeys).is_out_of_keys());
        assert!(!CoreError::invalid_argument("x").is_out_of_keys());
    }
}
