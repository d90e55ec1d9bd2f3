//! In-memory reference store for testing and ephemeral use.

use std::collections::BTreeMap;
use std::sync::RwLock;

use godb_types::CommitId;

use crate::error::{RefError, Result};
use crate::traits::RefStore;
use crate::types::{branch_ref_name, Head, Ref};

/// An in-memory implementation of [`RefStore`].
///
/// All data lives in a `BTreeMap` behind a `RwLock`. Data is lost when the
/// store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<BTreeMap<String, CommitId>>,
    head: RwLock<Option<Head>>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<CommitId>> {
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs.get(name).copied())
    }

    fn write_ref(&self, name: &str, target: &CommitId) -> Result<()> {
        let mut refs = self.refs.write().expect("lock poisoned");
        refs.insert(name.to_string(), *target);
        Ok(())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&CommitId>,
        target: &CommitId,
    ) -> Result<()> {
        let mut refs = self.refs.write().expect("lock poisoned");
        let actual = refs.get(name).copied();
        if actual.as_ref() != expected {
            return Err(RefError::Moved {
                name: name.to_string(),
                expected: expected.copied(),
                actual,
            });
        }
        refs.insert(name.to_string(), *target);
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        if let Some(Head::Symbolic(current)) = self.head.read().expect("lock poisoned").as_ref() {
            if name == branch_ref_name(current) {
                return Err(RefError::DeleteCurrentBranch {
                    name: current.clone(),
                });
            }
        }
        let mut refs = self.refs.write().expect("lock poisoned");
        Ok(refs.remove(name).is_some())
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<Ref>> {
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, target)| Ref::new(name.clone(), *target))
            .collect())
    }

    fn head(&self) -> Result<Option<Head>> {
        Ok(self.head.read().expect("lock poisoned").clone())
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        crate::names::validate_branch_name(branch)?;
        *self.head.write().expect("lock poisoned") = Some(Head::Symbolic(branch.to_string()));
        Ok(())
    }

    fn set_head_detached(&self, commit: &CommitId) -> Result<()> {
        *self.head.write().expect("lock poisoned") = Some(Head::Detached(*commit));
        Ok(())
    }
}
