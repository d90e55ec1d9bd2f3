//! Read-only views of the nodes stored at one commit.

use tracing::debug;

use godb_model::{
    FileKind, ModelError, ModelResult, Node, NodePath, NodeSerializer, ReferenceResolver,
    TypeModel,
};
use godb_store::{entry_at, flatten_tree, read_blob_at, EntryMode, ObjectStore, TreeBuilder};
use godb_types::{CommitId, NodeId, ObjectId};

use crate::error::{DiffError, DiffResult};

/// The collaborators every snapshot operation needs.
#[derive(Clone, Copy)]
pub struct Backend<'a> {
    pub store: &'a dyn ObjectStore,
    pub model: &'a TypeModel,
    pub serializer: &'a dyn NodeSerializer,
}

impl<'a> Backend<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        model: &'a TypeModel,
        serializer: &'a dyn NodeSerializer,
    ) -> Self {
        Self {
            store,
            model,
            serializer,
        }
    }

    pub fn snapshot(&self, commit: &CommitId) -> DiffResult<Snapshot<'a>> {
        Snapshot::at(*self, commit)
    }
}

/// All nodes at one commit. Immutable.
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    backend: Backend<'a>,
    commit: CommitId,
    tree: ObjectId,
}

impl<'a> Snapshot<'a> {
    pub fn at(backend: Backend<'a>, commit: &CommitId) -> DiffResult<Self> {
        let tree = backend.store.read_commit(commit)?.tree;
        Ok(Self {
            backend,
            commit: *commit,
            tree,
        })
    }

    pub fn backend(&self) -> Backend<'a> {
        self.backend
    }

    pub fn commit(&self) -> &CommitId {
        &self.commit
    }

    pub fn tree(&self) -> &ObjectId {
        &self.tree
    }

    /// Returns `true` if a node descriptor exists at `path`.
    pub fn contains(&self, path: &NodePath) -> DiffResult<bool> {
        Ok(entry_at(self.backend.store, &self.tree, &path.descriptor_path())?
            .is_some_and(|entry| entry.mode == EntryMode::Regular))
    }

    /// Read the node stored at `path`, attachments included.
    pub fn lookup(&self, path: &NodePath) -> DiffResult<Option<Node>> {
        let descriptor_path = path.descriptor_path();
        let Some(data) = read_blob_at(self.backend.store, &self.tree, &descriptor_path)? else {
            return Ok(None);
        };
        let resolver = SnapshotResolver::new(self);
        let mut node = self
            .backend
            .serializer
            .deserialize(&data, &self.commit, path, &resolver)
            .map_err(|e| self.deserialization_error(&descriptor_path, e))?;

        if let Some(dir) = entry_at(self.backend.store, &self.tree, &path.dir())? {
            let listing = self.backend.store.read_tree(&dir.object_id)?;
            for entry in listing.entries {
                if entry.mode != EntryMode::Regular
                    || !matches!(
                        NodePath::parse_file(&path.attachment_path(&entry.name)),
                        FileKind::Attachment(..)
                    )
                {
                    continue;
                }
                let blob = self.backend.store.read_blob(&entry.object_id)?;
                let content = String::from_utf8(blob.data).map_err(|e| DiffError::Deserialization {
                    path: path.attachment_path(&entry.name),
                    commit: self.commit,
                    reason: e.to_string(),
                })?;
                node.attachments.insert(entry.name, content);
            }
        }
        Ok(Some(node))
    }

    fn deserialization_error(&self, path: &str, error: ModelError) -> DiffError {
        DiffError::Deserialization {
            path: path.to_string(),
            commit: self.commit,
            reason: error.to_string(),
        }
    }

    fn descriptor_paths(&self) -> DiffResult<Vec<NodePath>> {
        Ok(flatten_tree(self.backend.store, &self.tree)?
            .keys()
            .filter_map(|file| match NodePath::parse_file(file) {
                FileKind::Descriptor(path) => Some(path),
                _ => None,
            })
            .collect())
    }

    /// Every node in the snapshot, ordered by descriptor path.
    pub fn nodes(&self) -> DiffResult<Vec<(NodePath, Node)>> {
        let mut nodes = Vec::new();
        for path in self.descriptor_paths()? {
            if let Some(node) = self.lookup(&path)? {
                nodes.push((path, node));
            }
        }
        Ok(nodes)
    }

    /// Locate a node by id, wherever it is stored.
    pub fn find(&self, id: NodeId) -> DiffResult<Option<(NodePath, Node)>> {
        let Some(path) = self.descriptor_paths()?.into_iter().find(|p| p.id() == id) else {
            return Ok(None);
        };
        Ok(self.lookup(&path)?.map(|node| (path, node)))
    }

    /// Direct children of the node at `parent`.
    pub fn children(&self, parent: &NodePath) -> DiffResult<Vec<(NodePath, Node)>> {
        let mut children = Vec::new();
        for path in self.descriptor_paths()? {
            if path.parent().as_ref() == Some(parent) {
                if let Some(node) = self.lookup(&path)? {
                    children.push((path, node));
                }
            }
        }
        Ok(children)
    }
}

/// Resolves node references against the snapshot being read.
pub struct SnapshotResolver<'s, 'a> {
    snapshot: &'s Snapshot<'a>,
}

impl<'s, 'a> SnapshotResolver<'s, 'a> {
    pub fn new(snapshot: &'s Snapshot<'a>) -> Self {
        Self { snapshot }
    }
}

impl ReferenceResolver for SnapshotResolver<'_, '_> {
    fn resolve(&self, path: &NodePath) -> ModelResult<Option<Node>> {
        self.snapshot
            .lookup(path)
            .map_err(|e| ModelError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Staging nodes into a tree
// ---------------------------------------------------------------------------

/// Write `node` (descriptor and attachments) into `builder` at `path`,
/// dropping attachments the node no longer has.
pub fn stage_node(
    builder: &mut TreeBuilder,
    backend: Backend<'_>,
    path: &NodePath,
    node: &Node,
) -> DiffResult<()> {
    let descriptor = backend.serializer.serialize(node)?;
    let descriptor_path = path.descriptor_path();
    builder.insert(descriptor_path.clone(), backend.store.write_blob(&descriptor)?)?;

    let stale: Vec<String> = builder
        .files_in(&path.dir())
        .into_iter()
        .map(|(name, _)| path.attachment_path(&name))
        .filter(|file| *file != descriptor_path)
        .filter(|file| match NodePath::parse_file(file) {
            FileKind::Attachment(_, name) => !node.attachments.contains_key(&name),
            _ => false,
        })
        .collect();
    for file in stale {
        builder.remove(&file);
    }

    for (name, content) in &node.attachments {
        let id = backend.store.write_blob(content.as_bytes())?;
        builder.insert(path.attachment_path(name), id)?;
    }
    debug!(path = %path, attachments = node.attachments.len(), "staged node");
    Ok(())
}

/// Remove the node at `path` and everything stored below it. Returns the
/// number of files removed.
pub fn unstage_node(builder: &mut TreeBuilder, path: &NodePath) -> usize {
    builder.remove_dir(&path.dir())
}
