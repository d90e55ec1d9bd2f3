//! Commit graph traversal for godb.
//!
//! Commits form a DAG through their parent links. [`CommitGraph`] walks that
//! DAG on top of an [`ObjectStore`](godb_store::ObjectStore): ancestry
//! queries, merge-base selection, and the oldest-first topological walk used
//! by migration planning and rebase.

pub mod error;
pub mod graph;

pub use error::{DagError, DagResult};
pub use graph::CommitGraph;
