//! The top-level entry points: [`Godb`] owns configuration, the type model
//! and the handle pool; a [`Connection`] works against one repository.

use std::ops::Deref;
use std::path::Path;

use tracing::info;

use godb_dag::CommitGraph;
use godb_diff::{compare, Backend, NodeChange, Snapshot};
use godb_merge::{
    MergeContext, MergeSession, MigrationDirection, MigrationPlanner, Migrator, RebaseSession,
    RebaseStatus,
};
use godb_model::{JsonNodeSerializer, Node, NodePath, NodeSerializer, TypeModel};
use godb_refs::RefStore;
use godb_types::{CommitId, NodeId, Signature};

use crate::config::GodbConfig;
use crate::error::{SdkError, SdkResult};
use crate::pool::{HandlePool, Lease};
use crate::repository::Repository;
use crate::transform::Transformations;

/// Configuration, type model, serializer and pooled repository handles.
pub struct Godb {
    config: GodbConfig,
    model: TypeModel,
    serializer: Box<dyn NodeSerializer>,
    pool: HandlePool<Repository>,
}

impl Godb {
    /// The model's comparison settings are replaced by `config.comparison`.
    pub fn new(config: GodbConfig, model: TypeModel) -> Self {
        let pool = HandlePool::new(&config.pool, config.storage);
        let model = model.with_comparison(config.comparison);
        Self {
            config,
            model,
            serializer: Box::new(JsonNodeSerializer),
            pool,
        }
    }

    pub fn with_serializer(mut self, serializer: impl NodeSerializer + 'static) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    pub fn config(&self) -> &GodbConfig {
        &self.config
    }

    pub fn model(&self) -> &TypeModel {
        &self.model
    }

    pub fn pool(&self) -> &HandlePool<Repository> {
        &self.pool
    }

    /// Borrow the repository at `location` from the pool.
    pub fn connect(&self, location: impl AsRef<Path>) -> SdkResult<Connection<'_>> {
        let lease = self.pool.borrow(location)?;
        Ok(Connection {
            repo: RepoHandle::Leased(lease),
            model: &self.model,
            serializer: self.serializer.as_ref(),
        })
    }
}

enum RepoHandle<'a> {
    Leased(Lease<'a, Repository>),
    Borrowed(&'a Repository),
}

impl Deref for RepoHandle<'_> {
    type Target = Repository;

    fn deref(&self) -> &Repository {
        match self {
            Self::Leased(lease) => lease,
            Self::Borrowed(repo) => *repo,
        }
    }
}

/// Lookup, comparison, transformation, merge and rebase against one
/// repository.
pub struct Connection<'a> {
    repo: RepoHandle<'a>,
    model: &'a TypeModel,
    serializer: &'a dyn NodeSerializer,
}

impl<'a> Connection<'a> {
    /// Work against a repository held outside any pool.
    pub fn new(repo: &'a Repository, model: &'a TypeModel, serializer: &'a dyn NodeSerializer) -> Self {
        Self {
            repo: RepoHandle::Borrowed(repo),
            model,
            serializer,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn backend(&self) -> Backend<'_> {
        Backend::new(self.repo.store(), self.model, self.serializer)
    }

    pub fn context(&self) -> MergeContext<'_> {
        MergeContext::new(self.backend(), self.repo.refs())
    }

    // ---- Reading ----

    pub fn head(&self, branch: &str) -> SdkResult<CommitId> {
        self.repo
            .refs()
            .branch(branch)?
            .ok_or_else(|| SdkError::BranchNotFound(branch.to_string()))
    }

    pub fn snapshot(&self, commit: &CommitId) -> SdkResult<Snapshot<'_>> {
        Ok(self.backend().snapshot(commit)?)
    }

    /// The node at `path` on the tip of `branch`.
    pub fn lookup(&self, branch: &str, path: &NodePath) -> SdkResult<Option<Node>> {
        Ok(self.snapshot(&self.head(branch)?)?.lookup(path)?)
    }

    /// Locate a node by id on the tip of `branch`.
    pub fn find(&self, branch: &str, id: NodeId) -> SdkResult<Option<(NodePath, Node)>> {
        Ok(self.snapshot(&self.head(branch)?)?.find(id)?)
    }

    pub fn compare(&self, left: &CommitId, right: &CommitId) -> SdkResult<Vec<NodeChange>> {
        Ok(compare(&self.snapshot(left)?, &self.snapshot(right)?)?)
    }

    /// Commits on `branch`, newest first.
    pub fn log(&self, branch: &str) -> SdkResult<Vec<CommitId>> {
        let graph = CommitGraph::new(self.repo.store());
        let mut commits = graph.commits_between(None, &self.head(branch)?)?;
        commits.reverse();
        Ok(commits)
    }

    // ---- Writing ----

    pub fn transform(&self) -> Transformations<'_> {
        Transformations::new(self.backend(), self.repo.refs())
    }

    /// Create `branch` at `commit`. Fails if the branch exists.
    pub fn create_branch(&self, branch: &str, commit: &CommitId) -> SdkResult<()> {
        self.repo.refs().advance_branch(branch, None, commit)?;
        info!(branch, commit = %commit.short_hex(), "created branch");
        Ok(())
    }

    pub fn migrations(&self, start: &CommitId, end: &CommitId) -> SdkResult<Vec<Migrator>> {
        Ok(MigrationPlanner::new(self.backend()).plan(start, end, MigrationDirection::Upgrade)?)
    }

    // ---- Merge ----

    /// Prepare merging `commit` into the tip of `branch`.
    pub fn merge(&self, branch: &str, commit: &CommitId) -> SdkResult<MergeSession> {
        let head = self.head(branch)?;
        let ours = self.snapshot(&head)?;
        Ok(MergeSession::initialize(&self.context(), &ours, &head, commit, branch)?)
    }

    pub fn apply(&self, session: &mut MergeSession, merger: &Signature) -> SdkResult<CommitId> {
        Ok(session.apply(&self.context(), merger)?)
    }

    // ---- Rebase ----

    /// Replay `branch`'s own commits onto `upstream`, moving the branch when
    /// done.
    pub fn rebase(&self, branch: &str, upstream: &CommitId, committer: Signature) -> SdkResult<RebaseSession> {
        let source = self.head(branch)?;
        Ok(RebaseSession::start(
            &self.context(),
            &source,
            upstream,
            Some(branch),
            committer,
        )?)
    }

    pub fn continue_rebase(&self, session: &mut RebaseSession) -> SdkResult<RebaseStatus> {
        Ok(session.continue_rebase(&self.context())?)
    }

    pub fn abort_rebase(&self, session: &mut RebaseSession) -> SdkResult<()> {
        Ok(session.abort()?)
    }
}
