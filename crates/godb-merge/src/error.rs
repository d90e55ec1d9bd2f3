//! Error types for merge and rebase.

use std::fmt;

use godb_dag::DagError;
use godb_diff::DiffError;
use godb_model::{ModelError, PropertyKey};
use godb_refs::RefError;
use godb_store::StoreError;
use godb_types::CommitId;

use crate::rebase::RebaseStatus;

/// Merge shapes the engine refuses to resolve on its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnsupportedMerge {
    /// One side deleted a node the other side modified.
    DeleteModify { path: String },
    /// One side added a node under a parent the other side deleted.
    AddUnderDeletedParent { path: String, parent: String },
    /// One side deleted a node the other side added or changed children under.
    DeleteWithLiveChildren { path: String, child: String },
    /// Migrations can only be planned upward.
    Downgrade,
}

impl fmt::Display for UnsupportedMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteModify { path } => write!(f, "{path} deleted on one side, modified on the other"),
            Self::AddUnderDeletedParent { path, parent } => {
                write!(f, "{path} added under deleted parent {parent}")
            }
            Self::DeleteWithLiveChildren { path, child } => {
                write!(f, "{path} deleted on one side, {child} changed under it on the other")
            }
            Self::Downgrade => f.write_str("downgrade migrations"),
        }
    }
}

/// Errors raised while initializing or applying a merge.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The snapshot handed in is not the declared head.
    #[error("head mismatch: session bound to {expected}, snapshot at {actual}")]
    HeadMismatch { expected: CommitId, actual: CommitId },

    #[error("merge session already applied")]
    AlreadyApplied,

    #[error("no merge base between {head} and {target}")]
    NoMergeBase { head: CommitId, target: CommitId },

    #[error("unsupported merge: {0}")]
    Unsupported(UnsupportedMerge),

    #[error("{count} edit conflict(s) still unresolved")]
    UnresolvedConflicts { count: usize },

    /// Tree conflicts must be removed by the caller before applying.
    #[error("{count} tree conflict(s) still present")]
    TreeConflictsPresent { count: usize },

    #[error("conflict on {key} already resolved")]
    AlreadyResolved { key: PropertyKey },

    /// The branch no longer points at the commit the session started from.
    #[error("branch {branch} moved: expected {expected}, found {actual:?}")]
    BranchMoved {
        branch: String,
        expected: CommitId,
        actual: Option<CommitId>,
    },

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("graph error: {0}")]
    Dag(#[from] DagError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Refs(#[from] RefError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors raised by a rebase session.
#[derive(Debug, thiserror::Error)]
pub enum RebaseError {
    /// The operation is not valid in the session's current status.
    #[error("cannot {operation} a rebase that is {status:?}")]
    InvalidState {
        status: RebaseStatus,
        operation: &'static str,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Convenience alias for rebase results.
pub type RebaseResult<T> = Result<T, RebaseError>;
