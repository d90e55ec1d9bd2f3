//! Path-level view of nested trees.
//!
//! Node storage works on `/`-separated file paths, while the object store
//! works on nested [`Tree`] objects. [`TreeBuilder`] converts between the two:
//! it flattens a root tree into a sorted `path -> blob id` map, accepts edits,
//! and writes the nested trees back. Empty directories are never written.

use std::collections::BTreeMap;

use godb_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{EntryMode, Tree, TreeEntry};
use crate::traits::ObjectStore;

/// Mutable, flattened image of a root tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeBuilder {
    files: BTreeMap<String, ObjectId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the contents of an existing root tree.
    pub fn from_tree(store: &dyn ObjectStore, tree_id: &ObjectId) -> StoreResult<Self> {
        Ok(Self {
            files: flatten_tree(store, tree_id)?,
        })
    }

    pub fn get(&self, path: &str) -> Option<&ObjectId> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Insert or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, blob: ObjectId) -> StoreResult<()> {
        let path = path.into();
        validate_path(&path)?;
        self.files.insert(path, blob);
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<ObjectId> {
        self.files.remove(path)
    }

    /// Remove every file below `dir`. Returns the number of files removed.
    pub fn remove_dir(&mut self, dir: &str) -> usize {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let doomed: Vec<String> = self
            .files
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &doomed {
            self.files.remove(path);
        }
        doomed.len()
    }

    /// Files directly inside `dir` (not in sub-directories), as `(name, id)`.
    pub fn files_in(&self, dir: &str) -> Vec<(String, ObjectId)> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, id)| {
                let rest = &path[prefix.len()..];
                (!rest.contains('/')).then(|| (rest.to_string(), *id))
            })
            .collect()
    }

    /// All files, sorted by path.
    pub fn files(&self) -> &BTreeMap<String, ObjectId> {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write all nested trees and return the root tree id.
    pub fn write(&self, store: &dyn ObjectStore) -> StoreResult<ObjectId> {
        let files: Vec<(&str, ObjectId)> =
            self.files.iter().map(|(p, id)| (p.as_str(), *id)).collect();
        write_dir(store, &files)
    }
}

/// Paths sharing a directory prefix are contiguous in sorted order, so each
/// directory is a contiguous run of `files`.
fn write_dir(store: &dyn ObjectStore, files: &[(&str, ObjectId)]) -> StoreResult<ObjectId> {
    let mut entries = Vec::new();
    let mut i = 0;
    while i < files.len() {
        let (path, id) = files[i];
        match path.split_once('/') {
            None => {
                entries.push(TreeEntry::new(EntryMode::Regular, path, id));
                i += 1;
            }
            Some((dir, _)) => {
                let mut children = Vec::new();
                while let Some((child_path, child_id)) = files.get(i) {
                    match child_path.split_once('/') {
                        Some((d, rest)) if d == dir => {
                            children.push((rest, *child_id));
                            i += 1;
                        }
                        _ => break,
                    }
                }
                let subtree = write_dir(store, &children)?;
                entries.push(TreeEntry::new(EntryMode::Directory, dir, subtree));
            }
        }
    }
    store.write_tree(&Tree::new(entries))
}

fn validate_path(path: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if path.split('/').any(|segment| segment.is_empty()) {
        return Err(invalid("path must not contain empty segments"));
    }
    if path.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(invalid("path must not contain relative segments"));
    }
    Ok(())
}

/// Flatten a root tree into `path -> blob id` (files only).
pub fn flatten_tree(
    store: &dyn ObjectStore,
    tree_id: &ObjectId,
) -> StoreResult<BTreeMap<String, ObjectId>> {
    let mut files = BTreeMap::new();
    flatten_into(store, tree_id, "", &mut files)?;
    Ok(files)
}

fn flatten_into(
    store: &dyn ObjectStore,
    tree_id: &ObjectId,
    prefix: &str,
    files: &mut BTreeMap<String, ObjectId>,
) -> StoreResult<()> {
    let tree = store.read_tree(tree_id)?;
    for entry in &tree.entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        match entry.mode {
            EntryMode::Regular => {
                files.insert(path, entry.object_id);
            }
            EntryMode::Directory => flatten_into(store, &entry.object_id, &path, files)?,
        }
    }
    Ok(())
}

/// Resolve the entry at `path` inside a root tree.
pub fn entry_at(
    store: &dyn ObjectStore,
    tree_id: &ObjectId,
    path: &str,
) -> StoreResult<Option<TreeEntry>> {
    let mut current = *tree_id;
    let mut segments = path.split('/').peekable();
    while let Some(segment) = segments.next() {
        let tree = store.read_tree(&current)?;
        let Some(entry) = tree.get(segment) else {
            return Ok(None);
        };
        if segments.peek().is_none() {
            return Ok(Some(entry.clone()));
        }
        if !entry.mode.is_directory() {
            return Ok(None);
        }
        current = entry.object_id;
    }
    Ok(None)
}

/// Read the blob stored at `path` inside a root tree, if any.
pub fn read_blob_at(
    store: &dyn ObjectStore,
    tree_id: &ObjectId,
    path: &str,
) -> StoreResult<Option<Vec<u8>>> {
    match entry_at(store, tree_id, path)? {
        Some(entry) if entry.mode == EntryMode::Regular => {
            Ok(Some(store.read_blob(&entry.object_id)?.data))
        }
        _ => Ok(None),
    }
}
