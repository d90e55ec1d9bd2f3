//! Merging and rebasing godb history.
//!
//! - [`MigrationPlanner`] finds the migrations a commit range introduces.
//! - [`MergeSession`] classifies the changes of one merge and applies them.
//! - [`RebaseSession`] replays a line of commits onto another, pausing on
//!   conflicts.

pub mod conflict;
pub mod engine;
pub mod error;
pub mod migration;
pub mod rebase;

#[cfg(test)]
pub(crate) mod testing;

pub use conflict::{merge_node, ConflictState, MergeOutcome, PropertyConflict};
pub use engine::{MergeContext, MergeMode, MergeSession};
pub use error::{MergeError, MergeResult, RebaseError, RebaseResult, UnsupportedMerge};
pub use migration::{MigrationDirection, MigrationPlanner, Migrator};
pub use rebase::{RebaseSession, RebaseStatus};
