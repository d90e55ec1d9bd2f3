//! Helpers shared by this crate's tests.

use std::cell::Cell;

use chrono::{TimeZone, Utc};

use godb_diff::{stage_node, Backend};
use godb_model::{JsonNodeSerializer, Migration, Node, NodePath, NodeType, PropertyDescriptor, TypeModel};
use godb_refs::InMemoryRefStore;
use godb_store::{Commit, InMemoryObjectStore, ObjectStore, TreeBuilder};
use godb_types::{CommitId, Signature};

use crate::engine::MergeContext;

pub struct Fixture {
    pub store: InMemoryObjectStore,
    pub refs: InMemoryRefStore,
    pub model: TypeModel,
    pub serializer: JsonNodeSerializer,
    clock: Cell<i64>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut model = TypeModel::default();
        model
            .register(
                NodeType::new("Table", "tables")
                    .property(PropertyDescriptor::modifiable("name"))
                    .property(PropertyDescriptor::modifiable("description"))
                    .property(PropertyDescriptor::fixed("created_by")),
            )
            .unwrap();
        model
            .register(
                NodeType::new("Field", "fields")
                    .under("Table")
                    .property(PropertyDescriptor::modifiable("name")),
            )
            .unwrap();
        Self {
            store: InMemoryObjectStore::new(),
            refs: InMemoryRefStore::new(),
            model,
            serializer: JsonNodeSerializer,
            clock: Cell::new(1_700_000_000),
        }
    }

    pub fn backend(&self) -> Backend<'_> {
        Backend::new(&self.store, &self.model, &self.serializer)
    }

    pub fn ctx(&self) -> MergeContext<'_> {
        MergeContext::new(self.backend(), &self.refs)
    }

    /// A signature one second later than the previous one.
    pub fn signature(&self) -> Signature {
        let now = self.clock.get() + 1;
        self.clock.set(now);
        Signature::at("Ada", "ada@example.com", Utc.timestamp_opt(now, 0).unwrap())
    }

    pub fn table(&self, name: &str) -> (NodePath, Node) {
        let node = Node::new("Table").with_property("name", name);
        (NodePath::root("tables", node.id), node)
    }

    pub fn field(&self, table: &NodePath, name: &str) -> (NodePath, Node) {
        let node = Node::new("Field").with_property("name", name);
        (table.child("fields", node.id), node)
    }

    pub fn migration(&self, migration: &Migration) -> (NodePath, Node) {
        (migration.path(), migration.to_node())
    }

    /// Commit the given nodes as the whole content of a snapshot.
    pub fn commit(&self, nodes: &[(NodePath, Node)], parents: &[CommitId], message: &str) -> CommitId {
        let mut builder = TreeBuilder::new();
        for (path, node) in nodes {
            stage_node(&mut builder, self.backend(), path, node).unwrap();
        }
        let tree = builder.write(&self.store).unwrap();
        let sig = self.signature();
        self.store
            .write_commit(&Commit::new(tree, parents.to_vec(), sig.clone(), sig, message))
            .unwrap()
    }
}
