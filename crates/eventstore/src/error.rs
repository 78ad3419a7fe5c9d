use std::time::Duration;

use thiserror::Error;

/// Error returned by event log operations.
#[derive(Clone, Debug, Error)]
pub enum EventstoreError {
    /// The storage backend could not be reached or failed mid-operation.
    ///
    /// Retryable as-is: nothing was applied.
    #[error("storage unavailable: {message}")]
    Storage { message: String },

    /// A push precondition no longer matches the stream tail.
    ///
    /// The caller must reload its write model before trying again.
    #[error(
        "concurrency conflict on {aggregate_type}/{aggregate_id}: expected sequence {expected}, stream is at {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: String,
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    /// The caller cancelled the operation before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not finish within the configured deadline.
    #[error("operation exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl EventstoreError {
    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        EventstoreError::Storage {
            message: message.into(),
        }
    }

    /// Returns true if the same call may succeed when repeated unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventstoreError::Storage { .. })
    }

    /// Returns true if the failure was an optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EventstoreError::ConcurrencyConflict { .. })
    }

    /// Returns true if the operation was aborted by cancellation or deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            EventstoreError::Cancelled | EventstoreError::DeadlineExceeded(_)
        )
    }
}

/// Error during event serialization/deserialization.
#[derive(Clone, Debug, Error)]
#[error("(de)serialization error: {message}")]
pub struct SerializationError {
    pub message: String,
}

impl SerializationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SerializationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}
