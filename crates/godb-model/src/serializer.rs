//! Node (de)serialization seam.

use godb_types::CommitId;

use crate::error::{ModelError, ModelResult};
use crate::node::Node;
use crate::path::NodePath;

/// Resolves references from one node to another node of the same snapshot.
pub trait ReferenceResolver {
    fn resolve(&self, path: &NodePath) -> ModelResult<Option<Node>>;
}

/// A resolver for serializers that never follow references.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoReferences;

impl ReferenceResolver for NoReferences {
    fn resolve(&self, _path: &NodePath) -> ModelResult<Option<Node>> {
        Ok(None)
    }
}

/// Turns nodes into descriptor bytes and back.
///
/// Attachments are stored as separate files and are not part of the
/// descriptor; readers fill them in after deserialization.
pub trait NodeSerializer: Send + Sync {
    fn serialize(&self, node: &Node) -> ModelResult<Vec<u8>>;

    /// Decode the descriptor stored at `path` in `commit`.
    fn deserialize(
        &self,
        data: &[u8],
        commit: &CommitId,
        path: &NodePath,
        resolver: &dyn ReferenceResolver,
    ) -> ModelResult<Node>;
}

/// Pretty-printed JSON descriptors.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonNodeSerializer;

impl NodeSerializer for JsonNodeSerializer {
    fn serialize(&self, node: &Node) -> ModelResult<Vec<u8>> {
        let mut bytes =
            serde_json::to_vec_pretty(node).map_err(|e| ModelError::Serialization(e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn deserialize(
        &self,
        data: &[u8],
        commit: &CommitId,
        path: &NodePath,
        _resolver: &dyn ReferenceResolver,
    ) -> ModelResult<Node> {
        let node: Node = serde_json::from_slice(data).map_err(|e| {
            ModelError::Serialization(format!("{path} at {}: {e}", commit.short_hex()))
        })?;
        if node.id != path.id() {
            return Err(ModelError::Serialization(format!(
                "{path} at {}: descriptor holds node {}",
                commit.short_hex(),
                node.id
            )));
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use godb_types::{NodeId, ObjectId};
    use serde_json::json;

    #[test]
    fn json_roundtrip() {
        let node = Node::new("Table").with_property("name", "users");
        let path = NodePath::root("tables", node.id);
        let bytes = JsonNodeSerializer.serialize(&node).unwrap();
        assert!(bytes.ends_with(b"}\n"));
        let back = JsonNodeSerializer
            .deserialize(&bytes, &ObjectId::null(), &path, &NoReferences)
            .unwrap();
        assert_eq!(back, node);
        assert_eq!(back.property("name"), Some(&json!("users")));
    }

    #[test]
    fn id_must_match_path() {
        let node = Node::new("Table");
        let elsewhere = NodePath::root("tables", NodeId::new());
        let bytes = JsonNodeSerializer.serialize(&node).unwrap();
        assert!(JsonNodeSerializer
            .deserialize(&bytes, &ObjectId::null(), &elsewhere, &NoReferences)
            .is_err());
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let path = NodePath::root("tables", NodeId::new());
        assert!(matches!(
            JsonNodeSerializer.deserialize(b"{not json", &ObjectId::null(), &path, &NoReferences),
            Err(ModelError::Serialization(_))
        ));
    }
}
