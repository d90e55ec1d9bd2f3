use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A node was written under a parent that is not in the tree.
    #[error("parent {parent} of {path} does not exist")]
    MissingParent { path: String, parent: String },

    #[error("failed to open repository at {location}: {reason}")]
    Open { location: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("store error: {0}")]
    Store(#[from] godb_store::StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] godb_refs::RefError),

    #[error("commit graph error: {0}")]
    Dag(#[from] godb_dag::DagError),

    #[error("model error: {0}")]
    Model(#[from] godb_model::ModelError),

    #[error("diff error: {0}")]
    Diff(#[from] godb_diff::DiffError),

    #[error("merge error: {0}")]
    Merge(#[from] godb_merge::MergeError),

    #[error("rebase error: {0}")]
    Rebase(#[from] godb_merge::RebaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
