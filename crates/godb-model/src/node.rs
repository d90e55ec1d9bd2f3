//! The logical node persisted in a snapshot tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use godb_types::NodeId;

use crate::property::PropertyKey;

/// A typed domain object.
///
/// Properties are serialized into the node's descriptor file. Attachments are
/// separate files in the node folder and never appear in the descriptor.
/// Attachments are text: they compare and merge as string values, and a
/// snapshot holding a non-UTF-8 attachment fails to load that node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(skip)]
    pub attachments: BTreeMap<String, String>,
}

impl Node {
    /// A fresh node with a new id.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self::with_id(NodeId::new(), type_name)
    }

    pub fn with_id(id: NodeId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            properties: BTreeMap::new(),
            attachments: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_attachment(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.attachments.insert(name.into(), content.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Value of a comparable slot; absent slots read as `null`.
    pub fn slot(&self, key: &PropertyKey) -> Value {
        match key {
            PropertyKey::Property(name) => self.properties.get(name).cloned().unwrap_or(Value::Null),
            PropertyKey::Attachment(name) => self
                .attachments
                .get(name)
                .map(|content| Value::String(content.clone()))
                .unwrap_or(Value::Null),
        }
    }

    /// Write a comparable slot. A `null` attachment removes the file.
    pub fn set_slot(&mut self, key: &PropertyKey, value: Value) {
        match key {
            PropertyKey::Property(name) => {
                self.properties.insert(name.clone(), value);
            }
            PropertyKey::Attachment(name) => match value {
                Value::Null => {
                    self.attachments.remove(name);
                }
                Value::String(content) => {
                    self.attachments.insert(name.clone(), content);
                }
                other => {
                    self.attachments.insert(name.clone(), other.to_string());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slots_read_null_when_absent() {
        let node = Node::new("Table").with_property("name", "users");
        assert_eq!(node.slot(&PropertyKey::Property("name".into())), json!("users"));
        assert_eq!(node.slot(&PropertyKey::Property("missing".into())), Value::Null);
        assert_eq!(node.slot(&PropertyKey::Attachment("doc".into())), Value::Null);
    }

    #[test]
    fn attachment_slots() {
        let mut node = Node::new("Table").with_attachment("doc.md", "# Users");
        let key = PropertyKey::Attachment("doc.md".into());
        assert_eq!(node.slot(&key), json!("# Users"));

        node.set_slot(&key, json!("# Accounts"));
        assert_eq!(node.attachments["doc.md"], "# Accounts");

        node.set_slot(&key, Value::Null);
        assert!(node.attachments.is_empty());
    }

    #[test]
    fn attachments_are_not_serialized() {
        let node = Node::new("Table")
            .with_property("name", "users")
            .with_attachment("doc.md", "text");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "Table");
        assert!(json.get("attachments").is_none());
    }
}
