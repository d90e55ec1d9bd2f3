//! Tree-level diff: the path-keyed add/modify/delete primitive.
//!
//! Walks two nested trees side by side, skipping identical subtrees by id,
//! and reports every changed file as a `/`-joined path. Results are sorted
//! lexicographically by path.

use godb_store::{entry_at, EntryMode, ObjectStore, Tree, TreeEntry};
use godb_types::ObjectId;

use crate::error::DiffResult;

/// How a file differs between the old and new tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A single changed file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeChange {
    pub path: String,
    pub kind: ChangeKind,
    pub old_id: Option<ObjectId>,
    pub new_id: Option<ObjectId>,
}

/// Compare two root trees.
pub fn diff_trees(
    store: &dyn ObjectStore,
    old_tree: &ObjectId,
    new_tree: &ObjectId,
) -> DiffResult<Vec<TreeChange>> {
    let mut changes = Vec::new();
    diff_dir(store, Some(old_tree), Some(new_tree), "", &mut changes)?;
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(changes)
}

/// Compare only the directory `dir` of two root trees. A directory missing on
/// one side counts as empty.
pub fn diff_subtree(
    store: &dyn ObjectStore,
    old_tree: &ObjectId,
    new_tree: &ObjectId,
    dir: &str,
) -> DiffResult<Vec<TreeChange>> {
    let old = dir_id(store, old_tree, dir)?;
    let new = dir_id(store, new_tree, dir)?;
    let mut changes = Vec::new();
    diff_dir(store, old.as_ref(), new.as_ref(), dir, &mut changes)?;
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(changes)
}

fn dir_id(store: &dyn ObjectStore, root: &ObjectId, dir: &str) -> DiffResult<Option<ObjectId>> {
    Ok(entry_at(store, root, dir)?
        .filter(|entry| entry.mode.is_directory())
        .map(|entry| entry.object_id))
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn diff_dir(
    store: &dyn ObjectStore,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
    prefix: &str,
    changes: &mut Vec<TreeChange>,
) -> DiffResult<()> {
    if old == new {
        return Ok(());
    }
    let load = |id: Option<&ObjectId>| -> DiffResult<Tree> {
        Ok(match id {
            Some(id) => store.read_tree(id)?,
            None => Tree::empty(),
        })
    };
    let old_tree = load(old)?;
    let new_tree = load(new)?;

    let mut old_entries = old_tree.entries.iter().peekable();
    let mut new_entries = new_tree.entries.iter().peekable();
    loop {
        let (o, n) = match (old_entries.peek(), new_entries.peek()) {
            (None, None) => break,
            (Some(o), None) => (Some(*o), None),
            (None, Some(n)) => (None, Some(*n)),
            (Some(o), Some(n)) => match o.name.cmp(&n.name) {
                std::cmp::Ordering::Less => (Some(*o), None),
                std::cmp::Ordering::Greater => (None, Some(*n)),
                std::cmp::Ordering::Equal => (Some(*o), Some(*n)),
            },
        };
        if o.is_some() {
            old_entries.next();
        }
        if n.is_some() {
            new_entries.next();
        }
        diff_entry(store, o, n, prefix, changes)?;
    }
    Ok(())
}

fn diff_entry(
    store: &dyn ObjectStore,
    old: Option<&TreeEntry>,
    new: Option<&TreeEntry>,
    prefix: &str,
    changes: &mut Vec<TreeChange>,
) -> DiffResult<()> {
    let name = match (old, new) {
        (Some(entry), _) | (None, Some(entry)) => entry.name.as_str(),
        (None, None) => return Ok(()),
    };
    let path = join(prefix, name);

    let file = |entry: Option<&TreeEntry>| {
        entry
            .filter(|e| e.mode == EntryMode::Regular)
            .map(|e| e.object_id)
    };
    let dir = |entry: Option<&TreeEntry>| {
        entry
            .filter(|e| e.mode.is_directory())
            .map(|e| e.object_id)
    };

    match (file(old), file(new)) {
        (Some(o), Some(n)) if o != n => changes.push(TreeChange {
            path: path.clone(),
            kind: ChangeKind::Modified,
            old_id: Some(o),
            new_id: Some(n),
        }),
        (Some(o), None) => changes.push(TreeChange {
            path: path.clone(),
            kind: ChangeKind::Deleted,
            old_id: Some(o),
            new_id: None,
        }),
        (None, Some(n)) => changes.push(TreeChange {
            path: path.clone(),
            kind: ChangeKind::Added,
            old_id: None,
            new_id: Some(n),
        }),
        _ => {}
    }

    let (old_dir, new_dir) = (dir(old), dir(new));
    if old_dir.is_some() || new_dir.is_some() {
        diff_dir(store, old_dir.as_ref(), new_dir.as_ref(), &path, changes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use godb_store::{InMemoryObjectStore, TreeBuilder};

    fn tree(store: &InMemoryObjectStore, files: &[(&str, &str)]) -> ObjectId {
        let mut builder = TreeBuilder::new();
        for (path, content) in files {
            builder
                .insert(*path, store.write_blob(content.as_bytes()).unwrap())
                .unwrap();
        }
        builder.write(store).unwrap()
    }

    fn summary(changes: &[TreeChange]) -> Vec<(&str, ChangeKind)> {
        changes.iter().map(|c| (c.path.as_str(), c.kind)).collect()
    }

    #[test]
    fn identical_trees_have_no_changes() {
        let store = InMemoryObjectStore::new();
        let t = tree(&store, &[("a/b.json", "1"), ("c.json", "2")]);
        assert!(diff_trees(&store, &t, &t).unwrap().is_empty());
    }

    #[test]
    fn reports_three_states_sorted_by_path() {
        let store = InMemoryObjectStore::new();
        let old = tree(&store, &[("a/x", "1"), ("a/y", "2"), ("b/z", "3")]);
        let new = tree(&store, &[("a/x", "1"), ("a/y", "changed"), ("a-b/w", "4")]);
        let changes = diff_trees(&store, &old, &new).unwrap();
        assert_eq!(
            summary(&changes),
            vec![
                ("a-b/w", ChangeKind::Added),
                ("a/y", ChangeKind::Modified),
                ("b/z", ChangeKind::Deleted),
            ]
        );
        assert!(changes[1].old_id.is_some() && changes[1].new_id.is_some());
    }

    #[test]
    fn file_replaced_by_directory() {
        let store = InMemoryObjectStore::new();
        let old = tree(&store, &[("a", "file")]);
        let new = tree(&store, &[("a/inner", "nested")]);
        assert_eq!(
            summary(&diff_trees(&store, &old, &new).unwrap()),
            vec![("a", ChangeKind::Deleted), ("a/inner", ChangeKind::Added)]
        );
    }

    #[test]
    fn subtree_diff_ignores_other_folders() {
        let store = InMemoryObjectStore::new();
        let old = tree(&store, &[("data/x", "1")]);
        let new = tree(&store, &[("data/x", "2"), ("$migrations/m/m.json", "{}")]);
        assert_eq!(
            summary(&diff_subtree(&store, &old, &new, "$migrations").unwrap()),
            vec![("$migrations/m/m.json", ChangeKind::Added)]
        );
        assert!(diff_subtree(&store, &old, &old, "$migrations")
            .unwrap()
            .is_empty());
    }
}
