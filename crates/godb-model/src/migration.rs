//! Schema migration nodes.
//!
//! Migrations are ordinary nodes stored under [`MIGRATIONS_FOLDER`]. The store
//! plans which ones a merge must run but never executes the scripts itself.

use serde_json::Value;

use godb_types::NodeId;

use crate::error::{ModelError, ModelResult};
use crate::node::Node;
use crate::path::{NodePath, MIGRATIONS_FOLDER};
use crate::property::{PropertyDescriptor, ValueComparer};
use crate::type_model::NodeType;

/// Name of the built-in migration node type.
pub const MIGRATION_TYPE: &str = "Migration";

/// The built-in migration type, registered in every [`TypeModel`](crate::TypeModel).
pub fn migration_type() -> NodeType {
    NodeType::new(MIGRATION_TYPE, MIGRATIONS_FOLDER)
        .property(PropertyDescriptor::modifiable("script").with_comparer(ValueComparer::Strict))
        .property(PropertyDescriptor::modifiable("idempotent").with_comparer(ValueComparer::Strict))
        .property(PropertyDescriptor::modifiable("description"))
}

/// Typed view of a migration node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migration {
    pub id: NodeId,
    pub script: String,
    /// Safe to run regardless of the current schema state.
    pub idempotent: bool,
    pub description: Option<String>,
}

impl Migration {
    pub fn new(script: impl Into<String>, idempotent: bool) -> Self {
        Self {
            id: NodeId::new(),
            script: script.into(),
            idempotent,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn path(&self) -> NodePath {
        NodePath::root(MIGRATIONS_FOLDER, self.id)
    }

    pub fn from_node(node: &Node) -> ModelResult<Self> {
        if node.type_name != MIGRATION_TYPE {
            return Err(ModelError::Serialization(format!(
                "node {} is a {}, not a {MIGRATION_TYPE}",
                node.id, node.type_name
            )));
        }
        let script = match node.property("script") {
            Some(Value::String(script)) => script.clone(),
            other => {
                return Err(ModelError::Serialization(format!(
                    "migration {} has no script: {other:?}",
                    node.id
                )))
            }
        };
        let idempotent = node
            .property("idempotent")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let description = node
            .property("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            id: node.id,
            script,
            idempotent,
            description,
        })
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::with_id(self.id, MIGRATION_TYPE)
            .with_property("script", self.script.clone())
            .with_property("idempotent", self.idempotent);
        if let Some(description) = &self.description {
            node.set_property("description", description.clone());
        }
        node
    }
}
