//! The [`RefStore`] trait defining the reference storage interface.

use godb_types::CommitId;

use crate::error::{RefError, Result};
use crate::names::validate_branch_name;
use crate::types::{branch_ref_name, Head, Ref, BRANCH_PREFIX};

/// Storage backend for named references.
///
/// Implementations must be thread-safe and provide atomic read/write/delete
/// operations on single refs. Branches live under `refs/heads/*`.
pub trait RefStore: Send + Sync {
    /// Read a ref by its canonical name (e.g. "refs/heads/main").
    fn read_ref(&self, name: &str) -> Result<Option<CommitId>>;

    /// Create or update a ref unconditionally.
    fn write_ref(&self, name: &str, target: &CommitId) -> Result<()>;

    /// Update a ref only if it currently points at `expected`
    /// (`None` = the ref must not exist yet).
    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&CommitId>,
        target: &CommitId,
    ) -> Result<()>;

    /// Delete a ref. Returns `Ok(true)` if it existed.
    fn delete_ref(&self, name: &str) -> Result<bool>;

    /// List all refs whose canonical name starts with `prefix`, sorted.
    fn list_refs(&self, prefix: &str) -> Result<Vec<Ref>>;

    /// Read the current HEAD state. `Ok(None)` if HEAD has not been set.
    fn head(&self) -> Result<Option<Head>>;

    /// Point HEAD at a branch (symbolic ref).
    fn set_head(&self, branch: &str) -> Result<()>;

    /// Detach HEAD at a commit.
    fn set_head_detached(&self, commit: &CommitId) -> Result<()>;

    // ---- Branch helpers ----

    /// Tip of a branch, by short name.
    fn branch(&self, branch: &str) -> Result<Option<CommitId>> {
        self.read_ref(&branch_ref_name(branch))
    }

    /// Tip of a branch that must exist.
    fn require_branch(&self, branch: &str) -> Result<CommitId> {
        self.branch(branch)?.ok_or_else(|| RefError::NotFound {
            name: branch_ref_name(branch),
        })
    }

    /// Move (or create) a branch.
    fn set_branch(&self, branch: &str, target: &CommitId) -> Result<()> {
        validate_branch_name(branch)?;
        self.write_ref(&branch_ref_name(branch), target)
    }

    /// Move a branch only if it still points at `expected`.
    fn advance_branch(
        &self,
        branch: &str,
        expected: Option<&CommitId>,
        target: &CommitId,
    ) -> Result<()> {
        validate_branch_name(branch)?;
        self.compare_and_swap(&branch_ref_name(branch), expected, target)
    }

    fn branches(&self) -> Result<Vec<Ref>> {
        self.list_refs(BRANCH_PREFIX)
    }

    /// Name of the branch HEAD points at.
    fn current_branch(&self) -> Result<Option<String>> {
        match self.head()? {
            Some(Head::Symbolic(name)) => Ok(Some(name)),
            Some(Head::Detached(_)) => Err(RefError::DetachedHead),
            None => Ok(None),
        }
    }

    /// Commit HEAD resolves to, following a symbolic HEAD through its branch.
    fn resolve_head(&self) -> Result<Option<CommitId>> {
        match self.head()? {
            Some(Head::Symbolic(name)) => self.branch(&name),
            Some(Head::Detached(commit)) => Ok(Some(commit)),
            None => Ok(None),
        }
    }
}
