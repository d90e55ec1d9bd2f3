//! Error types for the diff crate.

use godb_model::ModelError;
use godb_store::StoreError;
use godb_types::CommitId;

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A node's type is unknown or its placement is invalid.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A changed file could not be turned back into a node. Fatal for the
    /// whole comparison.
    #[error("cannot deserialize {path} at {commit}: {reason}")]
    Deserialization {
        path: String,
        commit: CommitId,
        reason: String,
    },
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
