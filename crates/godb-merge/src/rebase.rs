//! Resumable rebase.
//!
//! A [`RebaseSession`] replays the commits unique to a source line onto an
//! upstream commit, one replay merge per commit. When a replay conflicts the
//! session pauses with status [`RebaseStatus::Conflicts`]; the caller edits
//! [`RebaseSession::current_changes_mut`] and calls
//! [`RebaseSession::continue_rebase`].

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, info};

use godb_dag::CommitGraph;
use godb_types::{CommitId, Signature};

use crate::conflict::MergeOutcome;
use crate::engine::{move_branch, MergeContext, MergeSession};
use crate::error::{MergeError, RebaseError, RebaseResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseStatus {
    InProgress,
    Conflicts,
    Complete,
    Aborted,
}

/// Session state captured before `continue_rebase` mutates it.
struct Checkpoint {
    pending: VecDeque<CommitId>,
    replayed: usize,
    completed: usize,
    tip: CommitId,
    current: Option<MergeSession>,
    status: RebaseStatus,
}

#[derive(Debug)]
pub struct RebaseSession {
    branch: Option<String>,
    source_tip: CommitId,
    upstream: CommitId,
    committer: Signature,
    pending: VecDeque<CommitId>,
    replayed: Vec<CommitId>,
    completed: Vec<CommitId>,
    tip: CommitId,
    current: Option<MergeSession>,
    status: RebaseStatus,
}

impl RebaseSession {
    /// Start replaying `source_tip`'s own commits onto `upstream`.
    ///
    /// With a `branch`, the branch is moved from `source_tip` to the final
    /// tip once the rebase completes. Runs until done or until a replay
    /// conflicts.
    pub fn start(
        ctx: &MergeContext<'_>,
        source_tip: &CommitId,
        upstream: &CommitId,
        branch: Option<&str>,
        committer: Signature,
    ) -> RebaseResult<Self> {
        let graph = CommitGraph::new(ctx.backend.store);
        let base = graph
            .merge_base(source_tip, upstream)
            .map_err(MergeError::from)?
            .ok_or(MergeError::NoMergeBase {
                head: *source_tip,
                target: *upstream,
            })?;

        let (pending, tip) = if base == *upstream {
            // Already on top of upstream.
            (VecDeque::new(), *source_tip)
        } else {
            let upstream_history = graph.ancestors(upstream).map_err(MergeError::from)?;
            let mut pending = VecDeque::new();
            for commit in graph
                .commits_between(Some(&base), source_tip)
                .map_err(MergeError::from)?
            {
                if upstream_history.contains(&commit) {
                    continue;
                }
                // Merge commits carry no changes of their own to replay.
                if graph.commit(&commit).map_err(MergeError::from)?.is_merge() {
                    continue;
                }
                pending.push_back(commit);
            }
            (pending, *upstream)
        };

        info!(
            source = %source_tip.short_hex(),
            upstream = %upstream.short_hex(),
            base = %base.short_hex(),
            commits = pending.len(),
            "starting rebase"
        );
        let mut session = Self {
            branch: branch.map(str::to_string),
            source_tip: *source_tip,
            upstream: *upstream,
            committer,
            pending,
            replayed: Vec::new(),
            completed: Vec::new(),
            tip,
            current: None,
            status: RebaseStatus::InProgress,
        };
        session.advance(ctx)?;
        Ok(session)
    }

    pub fn status(&self) -> RebaseStatus {
        self.status
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn source_tip(&self) -> &CommitId {
        &self.source_tip
    }

    pub fn upstream(&self) -> &CommitId {
        &self.upstream
    }

    /// The rebased line so far; the final result once complete.
    pub fn tip(&self) -> &CommitId {
        &self.tip
    }

    /// Source commits already replayed, oldest first.
    pub fn replayed_commits(&self) -> &[CommitId] {
        &self.replayed
    }

    /// New commits written by the rebase, oldest first. Replays that changed
    /// nothing are skipped and have no entry here.
    pub fn completed_commits(&self) -> &[CommitId] {
        &self.completed
    }

    /// Source commits not yet replayed, including the one in conflict.
    pub fn pending_commits(&self) -> impl Iterator<Item = &CommitId> {
        self.pending.iter()
    }

    /// The source commit whose replay is paused.
    pub fn current_commit(&self) -> Option<&CommitId> {
        self.current.as_ref().and(self.pending.front())
    }

    pub fn current_changes(&self) -> Option<&[MergeOutcome]> {
        self.current.as_ref().map(MergeSession::outcomes)
    }

    pub fn current_changes_mut(&mut self) -> Option<&mut Vec<MergeOutcome>> {
        self.current.as_mut().map(MergeSession::outcomes_mut)
    }

    /// Accept our side's deletions for the paused replay. Returns how many
    /// tree conflicts were dropped.
    pub fn remove_tree_conflicts(&mut self) -> usize {
        let Some(changes) = self.current_changes_mut() else {
            return 0;
        };
        let before = changes.len();
        changes.retain(|o| !o.is_tree_conflict());
        before - changes.len()
    }

    /// Apply the paused replay and keep going.
    ///
    /// On any failure the session is left exactly as it was before the
    /// call: still paused on the same replay, with its resolutions intact.
    pub fn continue_rebase(&mut self, ctx: &MergeContext<'_>) -> RebaseResult<RebaseStatus> {
        self.expect_status(&[RebaseStatus::Conflicts, RebaseStatus::InProgress], "continue")?;
        let checkpoint = self.checkpoint();
        match self.resume(ctx) {
            Ok(()) => Ok(self.status),
            Err(e) => {
                debug!(error = %e, "continue failed, session restored");
                self.restore(checkpoint);
                Err(e)
            }
        }
    }

    fn resume(&mut self, ctx: &MergeContext<'_>) -> RebaseResult<()> {
        if let Some(mut current) = self.current.take() {
            let tip = current.apply(ctx, &self.committer)?;
            self.record(tip);
        }
        self.status = RebaseStatus::InProgress;
        self.advance(ctx)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pending: self.pending.clone(),
            replayed: self.replayed.len(),
            completed: self.completed.len(),
            tip: self.tip,
            current: self.current.clone(),
            status: self.status,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.pending = checkpoint.pending;
        self.replayed.truncate(checkpoint.replayed);
        self.completed.truncate(checkpoint.completed);
        self.tip = checkpoint.tip;
        self.current = checkpoint.current;
        self.status = checkpoint.status;
    }

    /// Drop the session. Objects already written stay in the store but no
    /// ref moves.
    pub fn abort(&mut self) -> RebaseResult<()> {
        self.expect_status(&[RebaseStatus::Conflicts, RebaseStatus::InProgress], "abort")?;
        self.current = None;
        self.pending.clear();
        self.status = RebaseStatus::Aborted;
        info!(source = %self.source_tip.short_hex(), "rebase aborted");
        Ok(())
    }

    fn expect_status(&self, allowed: &[RebaseStatus], operation: &'static str) -> RebaseResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(RebaseError::InvalidState {
                status: self.status,
                operation,
            })
        }
    }

    /// Record the replay of the front pending commit, which produced `tip`.
    fn record(&mut self, tip: CommitId) {
        if let Some(commit) = self.pending.pop_front() {
            self.replayed.push(commit);
        }
        if tip != self.tip {
            self.completed.push(tip);
            self.tip = tip;
        }
    }

    fn advance(&mut self, ctx: &MergeContext<'_>) -> RebaseResult<()> {
        while let Some(commit) = self.pending.front().copied() {
            let mut replay = MergeSession::replay(ctx, &self.tip, &commit)?;
            if replay.has_conflicts() {
                debug!(
                    commit = %commit.short_hex(),
                    conflicts = replay.blocking_count(),
                    "rebase paused on conflicts"
                );
                self.current = Some(replay);
                self.status = RebaseStatus::Conflicts;
                return Ok(());
            }
            let tip = replay.apply(ctx, &self.committer)?;
            self.record(tip);
        }

        if let Some(branch) = &self.branch {
            if self.tip != self.source_tip {
                move_branch(ctx.refs, branch, &self.source_tip, &self.tip)?;
            }
        }
        self.status = RebaseStatus::Complete;
        info!(
            tip = %self.tip.short_hex(),
            replayed = self.replayed.len(),
            written = self.completed.len(),
            "rebase complete"
        );
        Ok(())
    }
}
