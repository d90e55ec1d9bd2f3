//! Core reference types.

use godb_types::CommitId;

/// Namespace prefix of branch refs.
pub const BRANCH_PREFIX: &str = "refs/heads/";

/// Canonical ref name of a branch (`main` -> `refs/heads/main`).
pub fn branch_ref_name(branch: &str) -> String {
    format!("{BRANCH_PREFIX}{branch}")
}

/// A named pointer to a commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ref {
    /// Canonical name, e.g. `refs/heads/main`.
    pub name: String,
    pub target: CommitId,
}

impl Ref {
    pub fn new(name: impl Into<String>, target: CommitId) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }

    pub fn branch(branch: &str, target: CommitId) -> Self {
        Self::new(branch_ref_name(branch), target)
    }

    pub fn is_branch(&self) -> bool {
        self.name.starts_with(BRANCH_PREFIX)
    }

    /// Name without the namespace prefix.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix(BRANCH_PREFIX)
            .unwrap_or(&self.name)
    }
}

/// The state of HEAD: either symbolic (pointing to a branch) or detached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Head {
    /// HEAD points to a branch by name.
    Symbolic(String),
    /// HEAD is detached, pointing directly to a commit.
    Detached(CommitId),
}
