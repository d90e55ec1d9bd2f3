//! Error types for commit graph traversal.

use godb_store::StoreError;
use godb_types::ObjectId;

/// Errors that can occur while walking the commit graph.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A commit or one of its parents could not be read.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The topological walk could not order every commit.
    #[error("cycle detected involving commit {0}")]
    CycleDetected(ObjectId),
}

/// Convenience alias for graph results.
pub type DagResult<T> = Result<T, DagError>;
