//! Per-node merge outcomes and property conflicts.

use serde::Serialize;
use serde_json::Value;

use godb_model::{Node, NodePath, NodeType, PropertyKey, TypeModel, ValueComparer};

use crate::error::{MergeError, MergeResult};

/// Resolution state of a single property conflict.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ConflictState {
    Unresolved,
    Resolved(Value),
}

/// A property changed differently on both sides.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PropertyConflict {
    key: PropertyKey,
    ancestor: Value,
    ours: Value,
    theirs: Value,
    state: ConflictState,
}

impl PropertyConflict {
    pub fn new(key: PropertyKey, ancestor: Value, ours: Value, theirs: Value) -> Self {
        Self {
            key,
            ancestor,
            ours,
            theirs,
            state: ConflictState::Unresolved,
        }
    }

    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    pub fn ancestor_value(&self) -> &Value {
        &self.ancestor
    }

    pub fn our_value(&self) -> &Value {
        &self.ours
    }

    pub fn their_value(&self) -> &Value {
        &self.theirs
    }

    pub fn state(&self) -> &ConflictState {
        &self.state
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, ConflictState::Resolved(_))
    }

    pub fn resolved_value(&self) -> Option<&Value> {
        match &self.state {
            ConflictState::Resolved(value) => Some(value),
            ConflictState::Unresolved => None,
        }
    }

    /// Settle the conflict. A conflict can be resolved once.
    pub fn resolve(&mut self, value: impl Into<Value>) -> MergeResult<()> {
        if self.is_resolved() {
            return Err(MergeError::AlreadyResolved {
                key: self.key.clone(),
            });
        }
        self.state = ConflictState::Resolved(value.into());
        Ok(())
    }

    pub fn resolve_ours(&mut self) -> MergeResult<()> {
        let value = self.ours.clone();
        self.resolve(value)
    }

    pub fn resolve_theirs(&mut self) -> MergeResult<()> {
        let value = self.theirs.clone();
        self.resolve(value)
    }
}

/// What a merge does with one node.
#[derive(Clone, Debug, PartialEq)]
pub enum MergeOutcome {
    /// Write `node` as is.
    Clean { path: NodePath, node: Node },
    /// `node` carries every non-conflicting change; resolved conflict values
    /// are applied on top.
    EditConflict {
        path: NodePath,
        node: Node,
        conflicts: Vec<PropertyConflict>,
    },
    /// The node was edited on their side while our side deleted it or one of
    /// its ancestors. Never resolved automatically: remove the entry to
    /// accept the deletion.
    TreeConflict {
        path: NodePath,
        node: Node,
        deleted_path: NodePath,
        deleted_node: Node,
    },
    Add { path: NodePath, node: Node },
    Delete { path: NodePath, node: Node },
}

impl MergeOutcome {
    pub fn path(&self) -> &NodePath {
        match self {
            Self::Clean { path, .. }
            | Self::EditConflict { path, .. }
            | Self::TreeConflict { path, .. }
            | Self::Add { path, .. }
            | Self::Delete { path, .. } => path,
        }
    }

    pub fn is_tree_conflict(&self) -> bool {
        matches!(self, Self::TreeConflict { .. })
    }

    /// Number of property conflicts still waiting for a value.
    pub fn unresolved_count(&self) -> usize {
        match self {
            Self::EditConflict { conflicts, .. } => {
                conflicts.iter().filter(|c| !c.is_resolved()).count()
            }
            _ => 0,
        }
    }

    /// Returns `true` for anything that blocks applying the merge.
    pub fn is_blocking(&self) -> bool {
        self.is_tree_conflict() || self.unresolved_count() > 0
    }

    pub fn conflicts(&self) -> &[PropertyConflict] {
        match self {
            Self::EditConflict { conflicts, .. } => conflicts,
            _ => &[],
        }
    }

    pub fn conflicts_mut(&mut self) -> &mut [PropertyConflict] {
        match self {
            Self::EditConflict { conflicts, .. } => conflicts,
            _ => &mut [],
        }
    }

    /// The node to write, with resolved conflict values applied. `None` for
    /// deletions and tree conflicts.
    pub fn merged_node(&self) -> Option<Node> {
        match self {
            Self::Clean { node, .. } | Self::Add { node, .. } => Some(node.clone()),
            Self::EditConflict {
                node, conflicts, ..
            } => {
                let mut merged = node.clone();
                for conflict in conflicts {
                    if let Some(value) = conflict.resolved_value() {
                        merged.set_slot(conflict.key(), value.clone());
                    }
                }
                Some(merged)
            }
            Self::TreeConflict { .. } | Self::Delete { .. } => None,
        }
    }
}

/// Three-way merge of one node's comparable slots.
///
/// Starts from `ours` so non-modifiable properties keep our value. A slot
/// only conflicts when both sides moved away from the ancestor and disagree.
/// A missing ancestor reads every slot as `null`.
pub fn merge_node(
    model: &TypeModel,
    node_type: &NodeType,
    ancestor: Option<&Node>,
    ours: &Node,
    theirs: &Node,
) -> (Node, Vec<PropertyConflict>) {
    let mut slots = model.comparable_slots(node_type, ours, theirs);
    if let Some(ancestor) = ancestor {
        for name in ancestor.attachments.keys() {
            let key = PropertyKey::Attachment(name.clone());
            if !slots.iter().any(|(k, _)| *k == key) {
                slots.push((key, ValueComparer::Strict));
            }
        }
    }

    let mut merged = ours.clone();
    let mut conflicts = Vec::new();
    for (key, comparer) in slots {
        let base = ancestor.map_or(Value::Null, |a| a.slot(&key));
        let (our_value, their_value) = (ours.slot(&key), theirs.slot(&key));
        if comparer.equals(&their_value, &base) || comparer.equals(&our_value, &their_value) {
            continue;
        }
        if comparer.equals(&our_value, &base) {
            merged.set_slot(&key, their_value);
        } else {
            conflicts.push(PropertyConflict::new(key, base, our_value, their_value));
        }
    }
    (merged, conflicts)
}
