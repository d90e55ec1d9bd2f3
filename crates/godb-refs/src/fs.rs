//! Filesystem reference store.
//!
//! Each ref is a file under the repository directory named after its
//! canonical name (`<root>/refs/heads/main`) holding the commit id in hex.
//! HEAD lives in `<root>/HEAD` as either `ref: refs/heads/<branch>` or a bare
//! commit id. Every write goes through a temp file and a rename.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;
use walkdir::WalkDir;
use godb_types::CommitId;

use crate::error::{RefError, Result};
use crate::names::validate_branch_name;
use crate::traits::RefStore;
use crate::types::{branch_ref_name, Head, Ref, BRANCH_PREFIX};

const HEAD_FILE: &str = "HEAD";
const SYMBOLIC_PREFIX: &str = "ref: ";

/// A [`RefStore`] backed by plain files.
#[derive(Debug)]
pub struct FsRefStore {
    root: PathBuf,
    /// Serializes read-modify-write sequences within this process.
    write_lock: Mutex<()>,
}

impl FsRefStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(BRANCH_PREFIX))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn read_file(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_file(path: &Path, content: &str) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "ref path has no parent"))?;
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        writeln!(tmp, "{content}")?;
        tmp.persist(path).map_err(|e| RefError::Io(e.error))?;
        Ok(())
    }

    fn parse_commit(name: &str, content: &str) -> Result<CommitId> {
        content.parse().map_err(|e| RefError::Corrupt {
            name: name.to_string(),
            reason: format!("{e}"),
        })
    }
}

impl RefStore for FsRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<CommitId>> {
        Self::read_file(&self.ref_path(name))?
            .map(|content| Self::parse_commit(name, &content))
            .transpose()
    }

    fn write_ref(&self, name: &str, target: &CommitId) -> Result<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        Self::write_file(&self.ref_path(name), &target.to_hex())?;
        debug!(reference = name, target = %target.short_hex(), "updated ref");
        Ok(())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&CommitId>,
        target: &CommitId,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let actual = self.read_ref(name)?;
        if actual.as_ref() != expected {
            return Err(RefError::Moved {
                name: name.to_string(),
                expected: expected.copied(),
                actual,
            });
        }
        Self::write_file(&self.ref_path(name), &target.to_hex())?;
        debug!(reference = name, target = %target.short_hex(), "advanced ref");
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        if let Some(Head::Symbolic(current)) = self.head()? {
            if name == branch_ref_name(&current) {
                return Err(RefError::DeleteCurrentBranch { name: current });
            }
        }
        match fs::remove_file(self.ref_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<Ref>> {
        let mut refs = Vec::new();
        for entry in WalkDir::new(self.root.join("refs")).sort_by_file_name() {
            let entry = entry.map_err(|e| RefError::Io(io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // Temp files from an interrupted write are never refs.
            if !name.starts_with(prefix) || name.rsplit('/').next().is_some_and(|n| n.starts_with('.')) {
                continue;
            }
            if let Some(target) = self.read_ref(&name)? {
                refs.push(Ref::new(name, target));
            }
        }
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }

    fn head(&self) -> Result<Option<Head>> {
        let Some(content) = Self::read_file(&self.root.join(HEAD_FILE))? else {
            return Ok(None);
        };
        match content.strip_prefix(SYMBOLIC_PREFIX) {
            Some(reference) => {
                let branch = reference.strip_prefix(BRANCH_PREFIX).ok_or_else(|| {
                    RefError::Corrupt {
                        name: HEAD_FILE.into(),
                        reason: format!("symbolic target outside {BRANCH_PREFIX}: {reference}"),
                    }
                })?;
                Ok(Some(Head::Symbolic(branch.to_string())))
            }
            None => Ok(Some(Head::Detached(Self::parse_commit(HEAD_FILE, &content)?))),
        }
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        validate_branch_name(branch)?;
        let _guard = self.write_lock.lock().expect("lock poisoned");
        Self::write_file(
            &self.root.join(HEAD_FILE),
            &format!("{SYMBOLIC_PREFIX}{}", branch_ref_name(branch)),
        )
    }

    fn set_head_detached(&self, commit: &CommitId) -> Result<()> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        Self::write_file(&self.root.join(HEAD_FILE), &commit.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use godb_types::ObjectId;

    fn cid(b: u8) -> CommitId {
        ObjectId::from_hash([b; 32])
    }

    fn temp_refs() -> (tempfile::TempDir, FsRefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRefStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn branch_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FsRefStore::open(dir.path())
            .unwrap()
            .set_branch("feature/x", &cid(4))
            .unwrap();
        let reopened = FsRefStore::open(dir.path()).unwrap();
        assert_eq!(reopened.branch("feature/x").unwrap(), Some(cid(4)));
        assert!(dir.path().join("refs/heads/feature/x").is_file());
    }

    #[test]
    fn head_file_format() {
        let (dir, store) = temp_refs();
        store.set_branch("main", &cid(1)).unwrap();
        store.set_head("main").unwrap();
        let raw = fs::read_to_string(dir.path().join("HEAD")).unwrap();
        assert_eq!(raw, "ref: refs/heads/main\n");
        assert_eq!(store.resolve_head().unwrap(), Some(cid(1)));

        store.set_head_detached(&cid(2)).unwrap();
        assert_eq!(store.head().unwrap(), Some(Head::Detached(cid(2))));
    }

    #[test]
    fn compare_and_swap_on_disk() {
        let (_dir, store) = temp_refs();
        store.advance_branch("main", None, &cid(1)).unwrap();
        assert!(store.advance_branch("main", Some(&cid(9)), &cid(2)).is_err());
        store.advance_branch("main", Some(&cid(1)), &cid(2)).unwrap();
        assert_eq!(store.branch("main").unwrap(), Some(cid(2)));
    }

    #[test]
    fn list_refs_walks_nested_directories() {
        let (_dir, store) = temp_refs();
        store.set_branch("main", &cid(1)).unwrap();
        store.set_branch("feature/a", &cid(2)).unwrap();
        store.write_ref("refs/other/x", &cid(3)).unwrap();
        let names: Vec<String> = store.branches().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["refs/heads/feature/a", "refs/heads/main"]);
        assert_eq!(store.list_refs("refs/").unwrap().len(), 3);
    }

    #[test]
    fn corrupt_ref_is_reported() {
        let (dir, store) = temp_refs();
        fs::write(dir.path().join("refs/heads/broken"), "not-hex\n").unwrap();
        assert!(matches!(
            store.branch("broken"),
            Err(RefError::Corrupt { .. })
        ));
    }

    #[test]
    fn delete_refuses_current_branch() {
        let (_dir, store) = temp_refs();
        store.set_branch("main", &cid(1)).unwrap();
        store.set_head("main").unwrap();
        assert!(store.delete_ref("refs/heads/main").is_err());
    }
}
