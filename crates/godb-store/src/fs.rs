//! Loose-object store on the local filesystem.
//!
//! Layout mirrors git's `.git/objects/`: an object with hex id `abcdef...`
//! lives at `<root>/ab/cdef...`. Each file holds one kind byte followed by
//! the zstd-compressed payload. Hashes are verified on every read.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use godb_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// Default zstd level for loose objects.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Filesystem-backed object store.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    compression_level: i32,
}

impl FsObjectStore {
    /// Open (creating if necessary) an object directory.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    fn decode(id: &ObjectId, raw: &[u8]) -> StoreResult<StoredObject> {
        let (&tag, compressed) = raw.split_first().ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: "empty object file".into(),
        })?;
        let kind = ObjectKind::from_type_byte(tag).ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: format!("unknown kind byte {tag}"),
        })?;
        let data =
            zstd::decode_all(compressed).map_err(|e| StoreError::Compression(e.to_string()))?;
        let object = StoredObject::new(kind, data);
        let computed = object.compute_id();
        if computed != *id {
            return Err(StoreError::HashMismatch { id: *id, computed });
        }
        Ok(object)
    }
}

impl ObjectStore for FsObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        match fs::read(self.object_path(id)) {
            Ok(raw) => Self::decode(id, &raw).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::CorruptObject {
                id,
                reason: "object path has no parent directory".into(),
            })?;
        fs::create_dir_all(dir)?;

        let compressed = zstd::encode_all(object.data.as_slice(), self.compression_level)
            .map_err(|e| StoreError::Compression(e.to_string()))?;

        // Write to a temp file in the same directory, then rename: readers
        // never observe a partially written object.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&[object.kind.type_byte()])?;
        tmp.write_all(&compressed)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(object = %id.short_hex(), kind = %object.kind, size = object.size(), "wrote loose object");
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        match fs::remove_file(self.object_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Blob, Tree, TreeEntry, EntryMode};

    fn temp_store() -> (tempfile::TempDir, FsObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    #[test]
    fn write_then_read_blob() {
        let (_dir, store) = temp_store();
        let id = store.write_blob(b"hello loose object").unwrap();
        assert!(store.exists(&id).unwrap());
        assert_eq!(store.read_blob(&id).unwrap().data, b"hello loose object");
    }

    #[test]
    fn layout_uses_two_char_fanout() {
        let (_dir, store) = temp_store();
        let id = store.write_blob(b"fanout").unwrap();
        let hex = id.to_hex();
        assert!(store.root().join(&hex[..2]).join(&hex[2..]).is_file());
    }

    #[test]
    fn write_is_idempotent() {
        let (_dir, store) = temp_store();
        let obj = Blob::new(b"twice".to_vec()).to_stored_object();
        assert_eq!(store.write(&obj).unwrap(), store.write(&obj).unwrap());
    }

    #[test]
    fn tree_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let tree = Tree::new(vec![TreeEntry::new(
            EntryMode::Regular,
            "a.json",
            ObjectId::from_bytes(b"a"),
        )]);
        let id = {
            let store = FsObjectStore::open(dir.path()).unwrap();
            store.write_tree(&tree).unwrap()
        };
        let reopened = FsObjectStore::open(dir.path()).unwrap();
        assert_eq!(reopened.read_tree(&id).unwrap(), tree);
    }

    #[test]
    fn missing_object_reads_none() {
        let (_dir, store) = temp_store();
        let id = ObjectId::from_bytes(b"nope");
        assert!(store.read(&id).unwrap().is_none());
        assert!(!store.delete(&id).unwrap());
    }

    #[test]
    fn corrupted_file_is_detected() {
        let (_dir, store) = temp_store();
        let id = store.write_blob(b"original").unwrap();
        let other = StoredObject::new(ObjectKind::Blob, b"tampered".to_vec());
        let mut raw = vec![ObjectKind::Blob.type_byte()];
        raw.extend(zstd::encode_all(other.data.as_slice(), 3).unwrap());
        fs::write(store.object_path(&id), raw).unwrap();
        assert!(matches!(
            store.read(&id),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn delete_removes_file() {
        let (_dir, store) = temp_store();
        let id = store.write_blob(b"gone soon").unwrap();
        assert!(store.delete(&id).unwrap());
        assert!(!store.exists(&id).unwrap());
    }
}
