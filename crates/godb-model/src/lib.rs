//! Node data model for godb.
//!
//! Nodes are typed domain objects stored as files in a snapshot tree. This
//! crate fixes how they are addressed ([`NodePath`]), how their types are
//! declared ([`TypeModel`], [`NodeType`], [`PropertyDescriptor`]), how their
//! values compare ([`ValueComparer`]), and how they are encoded
//! ([`NodeSerializer`], [`JsonNodeSerializer`]).

pub mod error;
pub mod migration;
pub mod node;
pub mod path;
pub mod property;
pub mod serializer;
pub mod type_model;

pub use error::{ModelError, ModelResult};
pub use migration::{migration_type, Migration, MIGRATION_TYPE};
pub use node::Node;
pub use path::{is_reserved_folder, FileKind, NodePath, INDEX_FOLDER, MIGRATIONS_FOLDER};
pub use property::{ComparisonConfig, PropertyDescriptor, PropertyKey, ValueComparer};
pub use serializer::{JsonNodeSerializer, NoReferences, NodeSerializer, ReferenceResolver};
pub use type_model::{NodeType, TypeModel};
