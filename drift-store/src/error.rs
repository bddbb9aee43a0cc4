//! Error types for the record store.

use thiserror::Error;

/// Errors returned by [`crate::RecordStore`] operations.
///
/// All failures are synchronous and leave no partial state behind.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A malformed argument was rejected before any state change.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// No retained version matches the request.
    #[error("not found: {id}")]
    NotFound {
        /// The record id that was looked up.
        id: String,
    },

    /// Snapshot file I/O failed.
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding or decoding failed.
    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
