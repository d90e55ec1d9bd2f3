//! High-level API for godb.
//!
//! Start from [`Godb`]: it holds configuration, the registered node types and
//! a pool of repository handles. [`Godb::connect`] returns a [`Connection`]
//! for lookups, transformations, comparison, merge and rebase.

pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod pool;
pub mod repository;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{GodbConfig, LoggingConfig, PoolConfig, StorageConfig};
pub use connection::{Connection, Godb};
pub use error::{SdkError, SdkResult};
pub use pool::{HandlePool, HandleStats, Lease, PooledResource};
pub use repository::Repository;
pub use transform::Transformations;

// Re-export key types
pub use godb_diff::{NodeChange, PropertyChange, Snapshot};
pub use godb_merge::{
    MergeOutcome, MergeSession, Migrator, PropertyConflict, RebaseSession, RebaseStatus,
};
pub use godb_model::{
    ComparisonConfig, Migration, Node, NodePath, NodeType, PropertyDescriptor, PropertyKey,
    TypeModel,
};
pub use godb_types::{CommitId, NodeId, ObjectId, Signature};
