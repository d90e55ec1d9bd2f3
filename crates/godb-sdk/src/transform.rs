//! Batched node writes committed to a branch.

use tracing::info;

use godb_diff::{stage_node, unstage_node, Backend};
use godb_model::{Node, NodePath};
use godb_refs::RefStore;
use godb_store::{Commit, ObjectStore, TreeBuilder};
use godb_types::{CommitId, Signature};

use crate::error::{SdkError, SdkResult};

#[derive(Clone, Debug)]
enum Operation {
    Upsert {
        path: NodePath,
        parent: Option<NodePath>,
        node: Node,
    },
    Delete(NodePath),
}

/// Node creations, updates and deletions applied as one commit.
///
/// Parent/child rules are checked when an operation is queued; parent
/// existence is checked against the tree being built when committing.
pub struct Transformations<'a> {
    backend: Backend<'a>,
    refs: &'a dyn RefStore,
    operations: Vec<Operation>,
}

impl<'a> Transformations<'a> {
    pub fn new(backend: Backend<'a>, refs: &'a dyn RefStore) -> Self {
        Self {
            backend,
            refs,
            operations: Vec::new(),
        }
    }

    /// Write `node` under `parent` (at the root when `None`). Returns the
    /// node's path.
    pub fn create_or_update(&mut self, node: Node, parent: Option<&NodePath>) -> SdkResult<NodePath> {
        let model = self.backend.model;
        let node_type = model.get(&node.type_name)?;
        let parent_type = match parent {
            Some(parent) => Some(
                model
                    .by_folder(parent.folder())
                    .ok_or_else(|| SdkError::NodeNotFound(parent.to_string()))?
                    .name
                    .clone(),
            ),
            None => None,
        };
        model.validate_parent(&node_type.name, parent_type.as_deref())?;

        let path = NodePath::under(parent, &node_type.folder, node.id);
        self.operations.push(Operation::Upsert {
            path: path.clone(),
            parent: parent.cloned(),
            node,
        });
        Ok(path)
    }

    /// Delete the node at `path` and everything under it.
    pub fn delete(&mut self, path: &NodePath) -> &mut Self {
        self.operations.push(Operation::Delete(path.clone()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Commit on top of `branch`, creating the branch when absent.
    pub fn commit(self, branch: &str, message: &str, author: &Signature) -> SdkResult<CommitId> {
        let store = self.backend.store;
        let current = self.refs.branch(branch)?;
        let mut builder = match &current {
            Some(head) => TreeBuilder::from_tree(store, &store.read_commit(head)?.tree)?,
            None => TreeBuilder::new(),
        };

        let (mut written, mut removed) = (0usize, 0usize);
        for operation in self.operations {
            match operation {
                Operation::Upsert { path, parent, node } => {
                    if let Some(parent) = parent {
                        if !builder.contains(&parent.descriptor_path()) {
                            return Err(SdkError::MissingParent {
                                path: path.to_string(),
                                parent: parent.to_string(),
                            });
                        }
                    }
                    stage_node(&mut builder, self.backend, &path, &node)?;
                    written += 1;
                }
                Operation::Delete(path) => {
                    if unstage_node(&mut builder, &path) == 0 {
                        return Err(SdkError::NodeNotFound(path.to_string()));
                    }
                    removed += 1;
                }
            }
        }

        let tree = builder.write(store)?;
        let commit = Commit::new(
            tree,
            current.into_iter().collect(),
            author.clone(),
            author.clone(),
            message,
        );
        let id = store.write_commit(&commit)?;
        self.refs.advance_branch(branch, current.as_ref(), &id)?;
        info!(
            branch,
            commit = %id.short_hex(),
            written,
            removed,
            "committed transformations"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{signature, Fixture};
    use godb_model::ModelError;
    use serde_json::json;

    #[test]
    fn create_update_delete() {
        let fx = Fixture::new();
        let mut tx = fx.transform();
        let table = Node::new("Table").with_property("name", "users");
        let table_path = tx.create_or_update(table.clone(), None).unwrap();
        let field = Node::new("Field").with_property("name", "email");
        let field_path = tx.create_or_update(field.clone(), Some(&table_path)).unwrap();
        let first = tx.commit("main", "create", &signature()).unwrap();
        assert_eq!(fx.repo.refs().branch("main").unwrap(), Some(first));

        let snapshot = fx.backend().snapshot(&first).unwrap();
        assert_eq!(snapshot.lookup(&field_path).unwrap(), Some(field.clone()));

        let mut tx = fx.transform();
        tx.create_or_update(table.clone().with_property("name", "accounts"), None)
            .unwrap();
        let second = tx.commit("main", "rename", &signature()).unwrap();
        let commit = fx.repo.store().read_commit(&second).unwrap();
        assert_eq!(commit.parents, vec![first]);
        let renamed = fx.backend().snapshot(&second).unwrap().lookup(&table_path).unwrap().unwrap();
        assert_eq!(renamed.property("name"), Some(&json!("accounts")));

        let mut tx = fx.transform();
        tx.delete(&table_path);
        let third = tx.commit("main", "drop", &signature()).unwrap();
        let snapshot = fx.backend().snapshot(&third).unwrap();
        assert!(snapshot.nodes().unwrap().is_empty());
    }

    #[test]
    fn parent_rules_are_enforced() {
        let fx = Fixture::new();
        let mut tx = fx.transform();
        let err = tx
            .create_or_update(Node::new("Field"), None)
            .unwrap_err();
        assert!(matches!(err, SdkError::Model(ModelError::InvalidParent { .. })));

        let table = Node::new("Table");
        let ghost = NodePath::root("tables", table.id);
        tx.create_or_update(Node::new("Field"), Some(&ghost)).unwrap();
        assert!(matches!(
            tx.commit("main", "orphan", &signature()),
            Err(SdkError::MissingParent { .. })
        ));
        assert_eq!(fx.repo.refs().branch("main").unwrap(), None);
    }

    #[test]
    fn deleting_missing_node_fails() {
        let fx = Fixture::new();
        let mut tx = fx.transform();
        tx.delete(&NodePath::root("tables", godb_types::NodeId::new()));
        assert!(matches!(
            tx.commit("main", "nothing", &signature()),
            Err(SdkError::NodeNotFound(_))
        ));
    }
}
