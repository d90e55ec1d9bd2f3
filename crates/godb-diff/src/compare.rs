//! Node-level snapshot comparison.
//!
//! Turns the path-level tree diff into per-node changes: descriptor and
//! attachment paths are folded into their owning node, index structures are
//! dropped, and a node only counts as modified when one of its modifiable
//! properties or attachments differs under the property's comparer.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use godb_model::{FileKind, Node, NodePath, PropertyKey, INDEX_FOLDER};

use crate::error::DiffResult;
use crate::snapshot::Snapshot;
use crate::tree_diff::{diff_subtree, diff_trees, TreeChange};

/// One differing slot of a modified node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PropertyChange {
    pub key: PropertyKey,
    pub old: Value,
    pub new: Value,
}

/// How a node differs between two snapshots.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeChange {
    Added {
        path: NodePath,
        node: Node,
    },
    Modified {
        path: NodePath,
        old: Node,
        new: Node,
        properties: Vec<PropertyChange>,
    },
    Deleted {
        path: NodePath,
        node: Node,
    },
}

impl NodeChange {
    pub fn path(&self) -> &NodePath {
        match self {
            Self::Added { path, .. } | Self::Modified { path, .. } | Self::Deleted { path, .. } => {
                path
            }
        }
    }

    /// The node as it exists after the change (before it, for deletions).
    pub fn node(&self) -> &Node {
        match self {
            Self::Added { node, .. } | Self::Deleted { node, .. } => node,
            Self::Modified { new, .. } => new,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Modified { .. } => "modified",
            Self::Deleted { .. } => "deleted",
        }
    }
}

/// Compare every node of two snapshots.
///
/// Changes come out ordered by descriptor path. Any node that cannot be
/// deserialized fails the whole comparison.
pub fn compare(left: &Snapshot<'_>, right: &Snapshot<'_>) -> DiffResult<Vec<NodeChange>> {
    let store = left.backend().store;
    let files = diff_trees(store, left.tree(), right.tree())?;
    compare_files(left, right, &files)
}

/// Compare only the nodes stored under the root folder `folder`.
pub fn compare_folder(
    left: &Snapshot<'_>,
    right: &Snapshot<'_>,
    folder: &str,
) -> DiffResult<Vec<NodeChange>> {
    let store = left.backend().store;
    let files = diff_subtree(store, left.tree(), right.tree(), folder)?;
    compare_files(left, right, &files)
}

fn compare_files(
    left: &Snapshot<'_>,
    right: &Snapshot<'_>,
    files: &[TreeChange],
) -> DiffResult<Vec<NodeChange>> {
    // Keyed by descriptor path so attachments fold into their node.
    let mut touched: BTreeMap<String, NodePath> = BTreeMap::new();
    for file in files {
        if file.path.starts_with(&format!("{INDEX_FOLDER}/")) {
            continue;
        }
        if let FileKind::Descriptor(path) | FileKind::Attachment(path, _) =
            NodePath::parse_file(&file.path)
        {
            touched.entry(path.descriptor_path()).or_insert(path);
        }
    }

    let model = left.backend().model;
    let mut changes = Vec::new();
    for path in touched.into_values() {
        let change = match (left.lookup(&path)?, right.lookup(&path)?) {
            (None, Some(node)) => NodeChange::Added { path, node },
            (Some(node), None) => NodeChange::Deleted { path, node },
            (Some(old), Some(new)) => {
                let properties = diff_properties(left, &old, &new)?;
                if properties.is_empty() {
                    continue;
                }
                NodeChange::Modified {
                    path,
                    old,
                    new,
                    properties,
                }
            }
            // Attachment files left behind without a descriptor.
            (None, None) => continue,
        };
        if model.get(&change.node().type_name)?.is_index {
            continue;
        }
        changes.push(change);
    }

    debug!(
        left = %left.commit().short_hex(),
        right = %right.commit().short_hex(),
        files = files.len(),
        nodes = changes.len(),
        "compared snapshots"
    );
    Ok(changes)
}

/// Slots of `new`'s type whose value differs between `old` and `new`.
pub fn diff_properties(
    snapshot: &Snapshot<'_>,
    old: &Node,
    new: &Node,
) -> DiffResult<Vec<PropertyChange>> {
    let model = snapshot.backend().model;
    let node_type = model.get(&new.type_name)?;
    Ok(model
        .comparable_slots(node_type, old, new)
        .into_iter()
        .filter_map(|(key, comparer)| {
            let (before, after) = (old.slot(&key), new.slot(&key));
            (!comparer.equals(&before, &after)).then_some(PropertyChange {
                key,
                old: before,
                new: after,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiffError;
    use crate::snapshot::testing::Fixture;
    use godb_store::{ObjectStore, TreeBuilder};
    use godb_types::NodeId;
    use proptest::prelude::*;
    use serde_json::json;

    fn table(name: &str) -> Node {
        Node::new("Table").with_property("name", name)
    }

    // ---- Basic classification ----

    #[test]
    fn added_modified_deleted() {
        let fx = Fixture::new();
        let kept = table("kept");
        let edited = table("before");
        let dropped = table("dropped");
        let kept_path = NodePath::root("tables", kept.id);
        let edited_path = NodePath::root("tables", edited.id);
        let dropped_path = NodePath::root("tables", dropped.id);
        let base = fx.commit(
            &[(&kept_path, &kept), (&edited_path, &edited), (&dropped_path, &dropped)],
            &[],
        );

        let after = edited.clone().with_property("name", "after");
        let fresh = table("fresh");
        let fresh_path = NodePath::root("tables", fresh.id);
        let next = fx.commit(
            &[(&kept_path, &kept), (&edited_path, &after), (&fresh_path, &fresh)],
            &[base],
        );

        let backend = fx.backend();
        let changes = compare(&backend.snapshot(&base).unwrap(), &backend.snapshot(&next).unwrap())
            .unwrap();
        assert_eq!(changes.len(), 3);
        for change in &changes {
            match change {
                NodeChange::Added { path, .. } => assert_eq!(path, &fresh_path),
                NodeChange::Deleted { path, .. } => assert_eq!(path, &dropped_path),
                NodeChange::Modified { path, properties, .. } => {
                    assert_eq!(path, &edited_path);
                    assert_eq!(
                        properties,
                        &vec![PropertyChange {
                            key: PropertyKey::Property("name".into()),
                            old: json!("before"),
                            new: json!("after"),
                        }]
                    );
                }
            }
        }
        let order: Vec<String> = changes.iter().map(|c| c.path().descriptor_path()).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[test]
    fn non_modifiable_and_equivalent_values_are_not_changes() {
        let fx = Fixture::new();
        let node = table("users").with_property("created_by", "ada");
        let path = NodePath::root("tables", node.id);
        let base = fx.commit(&[(&path, &node)], &[]);

        // `created_by` is fixed and `description` goes from absent to "",
        // which the default text comparer treats as equal.
        let touched = node
            .clone()
            .with_property("created_by", "grace")
            .with_property("description", "");
        let next = fx.commit(&[(&path, &touched)], &[base]);

        let backend = fx.backend();
        let changes = compare(&backend.snapshot(&base).unwrap(), &backend.snapshot(&next).unwrap())
            .unwrap();
        assert!(changes.is_empty(), "{changes:?}");
    }

    #[test]
    fn attachment_change_folds_into_node() {
        let fx = Fixture::new();
        let node = table("users").with_attachment("notes.md", "v1");
        let path = NodePath::root("tables", node.id);
        let base = fx.commit(&[(&path, &node)], &[]);
        let edited = node.clone().with_attachment("notes.md", "v2");
        let next = fx.commit(&[(&path, &edited)], &[base]);

        let backend = fx.backend();
        let changes = compare(&backend.snapshot(&base).unwrap(), &backend.snapshot(&next).unwrap())
            .unwrap();
        assert_eq!(changes.len(), 1);
        let NodeChange::Modified { properties, .. } = &changes[0] else {
            panic!("expected modification, got {changes:?}");
        };
        assert_eq!(properties[0].key, PropertyKey::Attachment("notes.md".into()));
    }

    #[test]
    fn index_structures_are_excluded() {
        let fx = Fixture::new();
        let base = fx.commit(&[], &[]);

        let lookup = Node::new("Lookup");
        let lookup_path = NodePath::root("lookups", lookup.id);
        let mut builder = TreeBuilder::new();
        crate::snapshot::stage_node(&mut builder, fx.backend(), &lookup_path, &lookup).unwrap();
        builder
            .insert(
                format!("{INDEX_FOLDER}/by-name/x.json"),
                fx.store.write_blob(b"{}").unwrap(),
            )
            .unwrap();
        let next = fx.commit_tree(builder, &[base]);

        let backend = fx.backend();
        let changes = compare(&backend.snapshot(&base).unwrap(), &backend.snapshot(&next).unwrap())
            .unwrap();
        assert!(changes.is_empty(), "{changes:?}");
    }

    #[test]
    fn deserialization_failure_is_fatal() {
        let fx = Fixture::new();
        let good = table("good");
        let good_path = NodePath::root("tables", good.id);
        let base = fx.commit(&[], &[]);

        let mut builder = TreeBuilder::new();
        crate::snapshot::stage_node(&mut builder, fx.backend(), &good_path, &good).unwrap();
        let bad_path = NodePath::root("tables", NodeId::new());
        builder
            .insert(bad_path.descriptor_path(), fx.store.write_blob(b"not json").unwrap())
            .unwrap();
        let next = fx.commit_tree(builder, &[base]);

        let backend = fx.backend();
        let result = compare(&backend.snapshot(&base).unwrap(), &backend.snapshot(&next).unwrap());
        assert!(matches!(result, Err(DiffError::Deserialization { .. })));
    }

    #[test]
    fn compare_folder_limits_scope() {
        let fx = Fixture::new();
        let base = fx.commit(&[], &[]);
        let t = table("t");
        let t_path = NodePath::root("tables", t.id);
        let migration = godb_model::Migration::new("ALTER", false);
        let next = fx.commit(
            &[(&t_path, &t), (&migration.path(), &migration.to_node())],
            &[base],
        );
        let backend = fx.backend();
        let changes = compare_folder(
            &backend.snapshot(&base).unwrap(),
            &backend.snapshot(&next).unwrap(),
            godb_model::MIGRATIONS_FOLDER,
        )
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path(), &migration.path());
    }

    // ---- Properties ----

    proptest! {
        #[test]
        fn comparing_a_snapshot_with_itself_is_empty(
            names in proptest::collection::vec("[a-z ]{0,12}", 0..8),
            children in proptest::collection::vec(0usize..8, 0..8),
        ) {
            let fx = Fixture::new();
            let tables: Vec<(NodePath, Node)> = names
                .iter()
                .map(|n| {
                    let node = table(n);
                    (NodePath::root("tables", node.id), node)
                })
                .collect();
            let mut all = tables.clone();
            if !tables.is_empty() {
                for (i, parent) in children.iter().enumerate() {
                    let (parent_path, _) = &tables[parent % tables.len()];
                    let field = Node::new("Field").with_property("name", format!("f{i}"));
                    all.push((parent_path.child("fields", field.id), field));
                }
            }
            let refs: Vec<(&NodePath, &Node)> = all.iter().map(|(p, n)| (p, n)).collect();
            let first = fx.commit(&refs, &[]);
            // Same content under a different commit id.
            let second = fx.commit(&refs, &[first]);

            let backend = fx.backend();
            let a = backend.snapshot(&first).unwrap();
            let b = backend.snapshot(&second).unwrap();
            prop_assert!(compare(&a, &a).unwrap().is_empty());
            prop_assert!(compare(&a, &b).unwrap().is_empty());

            let empty = fx.commit(&[], &[]);
            let added = compare(&backend.snapshot(&empty).unwrap(), &a).unwrap();
            prop_assert_eq!(added.len(), all.len());
            prop_assert!(added.iter().all(|c| matches!(c, NodeChange::Added { .. })), "expected only Added changes");
        }
    }
}
