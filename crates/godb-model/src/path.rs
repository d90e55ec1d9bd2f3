//! Path addressing: where a node lives inside a snapshot tree.
//!
//! A node of type `T` with id `I` stored under the node folder `P` lives at
//!
//! ```text
//! P/<T.folder>/<I>/<I>.json      descriptor
//! P/<T.folder>/<I>/<name>        attachment `name`
//! P/<T.folder>/<I>/<C.folder>/…  children
//! ```
//!
//! Root nodes drop the `P/` prefix. Folders starting with `$` are reserved:
//! [`INDEX_FOLDER`] holds derived lookup tables and [`MIGRATIONS_FOLDER`]
//! holds migration nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use godb_types::NodeId;

use crate::error::{ModelError, ModelResult};

/// Root folder of derived index structures, never compared or merged.
pub const INDEX_FOLDER: &str = "$index";

/// Root folder of migration nodes.
pub const MIGRATIONS_FOLDER: &str = "$migrations";

/// Extension of node descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = ".json";

/// Returns `true` for folder names owned by the store.
pub fn is_reserved_folder(folder: &str) -> bool {
    folder.starts_with('$')
}

/// Tree-relative address of a node folder (`…/<type folder>/<id>`).
///
/// Always holds an even, non-zero number of segments alternating between
/// type folders and node ids.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath {
    segments: Vec<String>,
    id: NodeId,
}

impl NodePath {
    /// Path of a node stored at the root of the tree.
    pub fn root(folder: &str, id: NodeId) -> Self {
        Self {
            segments: vec![folder.to_string(), id.to_string()],
            id,
        }
    }

    /// Path of a node stored under this node.
    pub fn child(&self, folder: &str, id: NodeId) -> Self {
        let mut segments = self.segments.clone();
        segments.push(folder.to_string());
        segments.push(id.to_string());
        Self { segments, id }
    }

    /// Path of a node under an optional parent.
    pub fn under(parent: Option<&NodePath>, folder: &str, id: NodeId) -> Self {
        match parent {
            Some(parent) => parent.child(folder, id),
            None => Self::root(folder, id),
        }
    }

    /// Parse a node folder path such as `tables/<id>/fields/<id>`.
    pub fn parse(path: &str) -> ModelResult<Self> {
        let invalid = |reason: &str| ModelError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        let segments: Vec<String> = path.split('/').map(str::to_string).collect();
        if segments.len() % 2 != 0 || segments.iter().any(String::is_empty) {
            return Err(invalid("expected <folder>/<id> pairs"));
        }
        let mut id = None;
        for pair in segments.chunks(2) {
            id = Some(
                pair[1]
                    .parse::<NodeId>()
                    .map_err(|e| invalid(&e.to_string()))?,
            );
        }
        let id = id.ok_or_else(|| invalid("empty path"))?;
        Ok(Self { segments, id })
    }

    /// Classify a file path from a flattened tree.
    pub fn parse_file(path: &str) -> FileKind {
        let Some((dir, file)) = path.rsplit_once('/') else {
            return FileKind::Other;
        };
        if dir == INDEX_FOLDER || dir.starts_with(&format!("{INDEX_FOLDER}/")) {
            return FileKind::Other;
        }
        let Ok(node) = Self::parse(dir) else {
            return FileKind::Other;
        };
        if file == node.descriptor_file_name() {
            FileKind::Descriptor(node)
        } else {
            FileKind::Attachment(node, file.to_string())
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The type folder this node is stored in.
    pub fn folder(&self) -> &str {
        &self.segments[self.segments.len() - 2]
    }

    /// The first segment of the path.
    pub fn root_folder(&self) -> &str {
        &self.segments[0]
    }

    /// Number of nodes on the path, the node itself included.
    pub fn depth(&self) -> usize {
        self.segments.len() / 2
    }

    /// The enclosing node, `None` for root nodes.
    pub fn parent(&self) -> Option<NodePath> {
        if self.segments.len() <= 2 {
            return None;
        }
        let segments = self.segments[..self.segments.len() - 2].to_vec();
        let id = segments[segments.len() - 1].parse().ok()?;
        Some(Self { segments, id })
    }

    /// Enclosing nodes from the root down, excluding this node.
    pub fn ancestors(&self) -> Vec<NodePath> {
        let mut chain = Vec::with_capacity(self.depth().saturating_sub(1));
        let mut current = self.parent();
        while let Some(path) = current {
            current = path.parent();
            chain.push(path);
        }
        chain.reverse();
        chain
    }

    /// Returns `true` if `other` is stored somewhere below this node.
    pub fn contains(&self, other: &NodePath) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// The folder path, `/`-joined.
    pub fn dir(&self) -> String {
        self.segments.join("/")
    }

    fn descriptor_file_name(&self) -> String {
        format!("{}{DESCRIPTOR_EXTENSION}", self.id)
    }

    /// Full path of the node's descriptor file.
    pub fn descriptor_path(&self) -> String {
        format!("{}/{}", self.dir(), self.descriptor_file_name())
    }

    /// Full path of one of the node's attachments.
    pub fn attachment_path(&self, name: &str) -> String {
        format!("{}/{name}", self.dir())
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir())
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({})", self.dir())
    }
}

impl TryFrom<String> for NodePath {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.dir()
    }
}

/// What a file in a snapshot tree means to the node model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// The serialized node itself.
    Descriptor(NodePath),
    /// An auxiliary blob owned by the node, keyed by file name.
    Attachment(NodePath, String),
    /// Anything else: index tables, stray files.
    Other,
}

impl FileKind {
    /// The node this file belongs to, if any.
    pub fn node(&self) -> Option<&NodePath> {
        match self {
            Self::Descriptor(path) | Self::Attachment(path, _) => Some(path),
            Self::Other => None,
        }
    }
}
