//! Node type registration.
//!
//! Every node type is declared once, up front, with an explicit property
//! table. Comparison and merge read that table instead of inspecting node
//! contents to decide which fields matter.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::migration::migration_type;
use crate::node::Node;
use crate::path::is_reserved_folder;
use crate::property::{ComparisonConfig, PropertyDescriptor, PropertyKey, ValueComparer};

/// Declaration of one node type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    pub name: String,
    /// Folder the type's nodes are stored in.
    pub folder: String,
    pub properties: Vec<PropertyDescriptor>,
    /// Types this type may be stored under. Empty means root only.
    pub parent_types: Vec<String>,
    /// Derived lookup structures, excluded from comparison.
    pub is_index: bool,
}

impl NodeType {
    pub fn new(name: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folder: folder.into(),
            properties: Vec::new(),
            parent_types: Vec::new(),
            is_index: false,
        }
    }

    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.properties.push(descriptor);
        self
    }

    /// Allow nodes of this type under nodes of `parent`.
    pub fn under(mut self, parent: impl Into<String>) -> Self {
        self.parent_types.push(parent.into());
        self
    }

    pub fn index(mut self) -> Self {
        self.is_index = true;
        self
    }

    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn modifiable_properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.iter().filter(|p| p.modifiable)
    }

    pub fn accepts_parent(&self, parent: Option<&str>) -> bool {
        match parent {
            None => self.parent_types.is_empty(),
            Some(parent) => self.parent_types.iter().any(|p| p == parent),
        }
    }
}

/// Registry of node types, looked up by name and by folder.
#[derive(Clone, Debug)]
pub struct TypeModel {
    types: BTreeMap<String, NodeType>,
    folders: HashMap<String, String>,
    comparison: ComparisonConfig,
}

impl Default for TypeModel {
    fn default() -> Self {
        Self::new(ComparisonConfig::default())
    }
}

impl TypeModel {
    /// A model holding only the built-in migration type.
    pub fn new(comparison: ComparisonConfig) -> Self {
        let mut model = Self {
            types: BTreeMap::new(),
            folders: HashMap::new(),
            comparison,
        };
        model.insert(migration_type());
        model
    }

    fn insert(&mut self, node_type: NodeType) {
        self.folders
            .insert(node_type.folder.clone(), node_type.name.clone());
        self.types.insert(node_type.name.clone(), node_type);
    }

    /// Register a type. Parent types must be registered first, except for
    /// a type nesting under itself.
    pub fn register(&mut self, node_type: NodeType) -> ModelResult<()> {
        if self.types.contains_key(&node_type.name) {
            return Err(ModelError::DuplicateType(node_type.name));
        }
        if is_reserved_folder(&node_type.folder) || node_type.folder.contains('/') {
            return Err(ModelError::ReservedFolder(node_type.folder));
        }
        if let Some(existing) = self.folders.get(&node_type.folder) {
            return Err(ModelError::DuplicateFolder {
                folder: node_type.folder,
                existing: existing.clone(),
            });
        }
        if let Some(missing) = node_type
            .parent_types
            .iter()
            .find(|p| **p != node_type.name && !self.types.contains_key(*p))
        {
            return Err(ModelError::UnknownType(missing.clone()));
        }

        debug!(
            node_type = %node_type.name,
            folder = %node_type.folder,
            properties = node_type.properties.len(),
            "registered node type"
        );
        self.insert(node_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> ModelResult<&NodeType> {
        self.types
            .get(name)
            .ok_or_else(|| ModelError::UnknownType(name.to_string()))
    }

    pub fn by_folder(&self, folder: &str) -> Option<&NodeType> {
        self.folders.get(folder).and_then(|name| self.types.get(name))
    }

    pub fn types(&self) -> impl Iterator<Item = &NodeType> {
        self.types.values()
    }

    /// Replace the default comparison settings.
    pub fn with_comparison(mut self, comparison: ComparisonConfig) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn comparison(&self) -> &ComparisonConfig {
        &self.comparison
    }

    /// Check that a node of type `child` may be stored under a node of type
    /// `parent` (`None` = at the root).
    pub fn validate_parent(&self, child: &str, parent: Option<&str>) -> ModelResult<()> {
        let child_type = self.get(child)?;
        if let Some(parent) = parent {
            self.get(parent)?;
        }
        if child_type.accepts_parent(parent) {
            Ok(())
        } else {
            Err(ModelError::InvalidParent {
                child: child.to_string(),
                parent: parent.map(str::to_string),
            })
        }
    }

    pub fn comparer(&self, descriptor: &PropertyDescriptor) -> ValueComparer {
        descriptor
            .comparer
            .unwrap_or_else(|| self.comparison.text_comparer())
    }

    /// Every slot that takes part in comparing `left` with `right`, in key
    /// order: the type's modifiable properties, then the attachments present
    /// on either side.
    pub fn comparable_slots(
        &self,
        node_type: &NodeType,
        left: &Node,
        right: &Node,
    ) -> Vec<(PropertyKey, ValueComparer)> {
        let mut slots: Vec<(PropertyKey, ValueComparer)> = node_type
            .modifiable_properties()
            .map(|p| (PropertyKey::Property(p.name.clone()), self.comparer(p)))
            .collect();
        let mut attachments: Vec<&String> = left
            .attachments
            .keys()
            .chain(right.attachments.keys())
            .collect();
        attachments.sort();
        attachments.dedup();
        slots.extend(
            attachments
                .into_iter()
                .map(|name| (PropertyKey::Attachment(name.clone()), ValueComparer::Strict)),
        );
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }
}
