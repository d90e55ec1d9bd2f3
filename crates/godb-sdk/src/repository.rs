//! A repository handle: an object store and a ref store at one location.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use godb_refs::{FsRefStore, InMemoryRefStore, RefStore};
use godb_store::{FsObjectStore, InMemoryObjectStore, ObjectStore};

use crate::config::StorageConfig;
use crate::error::{SdkError, SdkResult};
use crate::pool::PooledResource;

/// Directory holding loose objects, relative to the repository location.
pub const OBJECTS_DIR: &str = "objects";

pub struct Repository {
    location: PathBuf,
    store: Box<dyn ObjectStore>,
    refs: Box<dyn RefStore>,
}

impl Repository {
    /// Open (creating if needed) an on-disk repository.
    ///
    /// Objects go under `<location>/objects`, refs under `<location>/refs`.
    pub fn open(location: impl Into<PathBuf>, storage: &StorageConfig) -> SdkResult<Self> {
        let location = location.into();
        let open_error = |reason: String| SdkError::Open {
            location: location.clone(),
            reason,
        };
        let store = FsObjectStore::open(location.join(OBJECTS_DIR))
            .map_err(|e| open_error(e.to_string()))?
            .with_compression_level(storage.compression_level);
        let refs = FsRefStore::open(&location).map_err(|e| open_error(e.to_string()))?;
        info!(location = %location.display(), "opened repository");
        Ok(Self {
            location,
            store: Box::new(store),
            refs: Box::new(refs),
        })
    }

    /// A repository living only in memory.
    pub fn in_memory() -> Self {
        Self {
            location: PathBuf::from(":memory:"),
            store: Box::new(InMemoryObjectStore::new()),
            refs: Box::new(InMemoryRefStore::new()),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn refs(&self) -> &dyn RefStore {
        self.refs.as_ref()
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl PooledResource for Repository {
    type Options = StorageConfig;

    fn open(location: &Path, options: &StorageConfig) -> SdkResult<Self> {
        Repository::open(location, options)
    }

    fn close(&self) -> SdkResult<()> {
        // Writes are persisted as they happen; nothing is buffered.
        debug!(location = %self.location.display(), "closed repository");
        Ok(())
    }
}
