//! Foundation types for godb.
//!
//! Every other godb crate depends on `godb-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content address (BLAKE3 hash) of a blob, tree or commit
//! - [`CommitId`]: Alias of [`ObjectId`] used where a commit is expected
//! - [`NodeId`]: Storage-independent identity of a logical node (UUID v7)
//! - [`Signature`]: Author/committer identity with a timestamp

pub mod error;
pub mod node_id;
pub mod object;
pub mod signature;

pub use error::TypeError;
pub use node_id::NodeId;
pub use object::{CommitId, ObjectId};
pub use signature::Signature;
