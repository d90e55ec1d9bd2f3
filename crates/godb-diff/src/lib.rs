//! Structured comparison for godb.
//!
//! Two layers:
//!
//! - [`tree_diff`] -- the backend primitive: a path-sorted list of added,
//!   modified and deleted files between two trees.
//! - [`compare`] -- the snapshot comparer: folds file changes into
//!   per-node [`NodeChange`]s with property-level [`PropertyChange`]s.
//!
//! [`Snapshot`] reads nodes at a commit; [`stage_node`] writes them back into
//! a [`TreeBuilder`](godb_store::TreeBuilder).

pub mod compare;
pub mod error;
pub mod snapshot;
pub mod tree_diff;

pub use compare::{compare, compare_folder, diff_properties, NodeChange, PropertyChange};
pub use error::{DiffError, DiffResult};
pub use snapshot::{stage_node, unstage_node, Backend, Snapshot, SnapshotResolver};
pub use tree_diff::{diff_subtree, diff_trees, ChangeKind, TreeChange};
