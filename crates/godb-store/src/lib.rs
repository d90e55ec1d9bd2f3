//! Content-addressed object storage for godb.
//!
//! A hash-keyed object store analogous to git's `.git/objects/` directory.
//! Every piece of data -- node descriptors, attachments, directory listings,
//! commits -- is an immutable object identified by its BLAKE3 hash
//! (domain-separated by object kind).
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`Commit`] -- root tree, parents, author/committer and message
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- zstd-compressed loose objects on disk
//!
//! [`TreeBuilder`] flattens nested trees into `/`-separated paths and writes
//! edited path maps back as nested trees.

pub mod error;
pub mod fs;
pub mod hasher;
pub mod memory;
pub mod object;
pub mod traits;
pub mod tree_builder;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use hasher::ContentHasher;
pub use memory::InMemoryObjectStore;
pub use object::{Blob, Commit, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry};
pub use traits::ObjectStore;
pub use tree_builder::{entry_at, flatten_tree, read_blob_at, TreeBuilder};
