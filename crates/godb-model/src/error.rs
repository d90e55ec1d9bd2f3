//! Error types for the node model.

use thiserror::Error;

/// Errors raised by type registration, path parsing, and node serialization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// No type is registered under this name.
    #[error("unknown node type: {0}")]
    UnknownType(String),

    #[error("node type already registered: {0}")]
    DuplicateType(String),

    /// Another type already stores its nodes in this folder.
    #[error("folder {folder:?} already used by type {existing}")]
    DuplicateFolder { folder: String, existing: String },

    /// Folder names starting with `$` belong to the store itself.
    #[error("folder {0:?} is reserved")]
    ReservedFolder(String),

    /// A node was placed under a parent its type does not accept.
    #[error("type {child} cannot be stored under {}", parent.as_deref().unwrap_or("the root"))]
    InvalidParent {
        child: String,
        parent: Option<String>,
    },

    #[error("invalid node path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for model results.
pub type ModelResult<T> = Result<T, ModelError>;
