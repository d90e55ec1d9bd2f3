//! The merge engine.
//!
//! A [`MergeSession`] is bound to one head commit. Initializing it finds the
//! merge base, plans migrations (narrowing the target when a migration must be
//! applied first), compares both sides against the base and classifies every
//! change on their side into a [`MergeOutcome`]. Nothing is written until
//! [`MergeSession::apply`], which may run once.

use std::collections::HashMap;
use std::iter;

use serde::Serialize;
use tracing::{debug, info};

use godb_dag::CommitGraph;
use godb_diff::{compare, stage_node, unstage_node, Backend, NodeChange, Snapshot};
use godb_model::{Node, NodePath, TypeModel};
use godb_refs::{RefError, RefStore};
use godb_store::{Commit, ObjectStore, TreeBuilder};
use godb_types::{CommitId, ObjectId, Signature};

use crate::conflict::{merge_node, MergeOutcome};
use crate::error::{MergeError, MergeResult, UnsupportedMerge};
use crate::migration::{MigrationDirection, MigrationPlanner, Migrator};

/// Everything a merge reads from and writes to.
#[derive(Clone, Copy)]
pub struct MergeContext<'a> {
    pub backend: Backend<'a>,
    pub refs: &'a dyn RefStore,
}

impl<'a> MergeContext<'a> {
    pub fn new(backend: Backend<'a>, refs: &'a dyn RefStore) -> Self {
        Self { backend, refs }
    }
}

/// How applying the session moves history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// The target is already part of head.
    UpToDate,
    /// Head is the merge base: move the branch, no new commit.
    FastForward,
    /// Create a commit with parents `[head, target]`.
    Merge,
    /// Replay one commit onto head, creating a single-parent commit.
    Replay,
}

/// A pending merge, bound to one head commit.
#[derive(Clone, Debug)]
pub struct MergeSession {
    branch: Option<String>,
    head: CommitId,
    head_tree: ObjectId,
    requested: CommitId,
    target: CommitId,
    base: CommitId,
    mode: MergeMode,
    outcomes: Vec<MergeOutcome>,
    migrators: Vec<Migrator>,
    required_migrator: Option<Migrator>,
    replayed: Option<Commit>,
    applied: bool,
}

impl MergeSession {
    /// Prepare merging `merge_commit` into `branch`, whose tip is `head`.
    ///
    /// `ours` must be the snapshot at `head`.
    pub fn initialize(
        ctx: &MergeContext<'_>,
        ours: &Snapshot<'_>,
        head: &CommitId,
        merge_commit: &CommitId,
        branch: &str,
    ) -> MergeResult<Self> {
        if ours.commit() != head {
            return Err(MergeError::HeadMismatch {
                expected: *head,
                actual: *ours.commit(),
            });
        }
        let backend = ctx.backend;
        let graph = CommitGraph::new(backend.store);
        let base = graph
            .merge_base(head, merge_commit)?
            .ok_or(MergeError::NoMergeBase {
                head: *head,
                target: *merge_commit,
            })?;

        let mut session = Self {
            branch: Some(branch.to_string()),
            head: *head,
            head_tree: *ours.tree(),
            requested: *merge_commit,
            target: *merge_commit,
            base,
            mode: MergeMode::UpToDate,
            outcomes: Vec::new(),
            migrators: Vec::new(),
            required_migrator: None,
            replayed: None,
            applied: false,
        };
        if base == *merge_commit {
            info!(branch, head = %head.short_hex(), "already up to date");
            return Ok(session);
        }

        session.migrators = MigrationPlanner::new(backend).plan(
            &base,
            merge_commit,
            MigrationDirection::Upgrade,
        )?;
        if let Some(first) = session.migrators.first() {
            if first.commit() != merge_commit {
                session.target = *first.commit();
                session.required_migrator = Some(first.clone());
            }
        }
        session.mode = if base == *head {
            MergeMode::FastForward
        } else {
            MergeMode::Merge
        };

        let base_snapshot = backend.snapshot(&base)?;
        let theirs = compare(&base_snapshot, &backend.snapshot(&session.target)?)?;
        let our_changes = match session.mode {
            MergeMode::FastForward => Vec::new(),
            _ => compare(&base_snapshot, ours)?,
        };
        session.outcomes = classify(backend.model, theirs, our_changes)?;

        info!(
            branch,
            head = %head.short_hex(),
            target = %session.target.short_hex(),
            base = %base.short_hex(),
            mode = ?session.mode,
            partial = session.is_partial_merge(),
            outcomes = session.outcomes.len(),
            conflicts = session.blocking_count(),
            "initialized merge"
        );
        Ok(session)
    }

    /// Prepare replaying `commit` (its delta against its first parent) onto
    /// `onto`. Used by rebase; no branch is bound.
    pub fn replay(ctx: &MergeContext<'_>, onto: &CommitId, commit: &CommitId) -> MergeResult<Self> {
        let backend = ctx.backend;
        let original = backend.store.read_commit(commit)?;
        let parent = original
            .first_parent()
            .copied()
            .ok_or(MergeError::NoMergeBase {
                head: *onto,
                target: *commit,
            })?;

        let base_snapshot = backend.snapshot(&parent)?;
        let onto_snapshot = backend.snapshot(onto)?;
        let theirs = compare(&base_snapshot, &backend.snapshot(commit)?)?;
        let ours = compare(&base_snapshot, &onto_snapshot)?;
        let outcomes = classify(backend.model, theirs, ours)?;

        debug!(
            commit = %commit.short_hex(),
            onto = %onto.short_hex(),
            outcomes = outcomes.len(),
            "prepared replay"
        );
        Ok(Self {
            branch: None,
            head: *onto,
            head_tree: *onto_snapshot.tree(),
            requested: *commit,
            target: *commit,
            base: parent,
            mode: MergeMode::Replay,
            outcomes,
            migrators: Vec::new(),
            required_migrator: None,
            replayed: Some(original),
            applied: false,
        })
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn head(&self) -> &CommitId {
        &self.head
    }

    pub fn base(&self) -> &CommitId {
        &self.base
    }

    /// The commit this step merges; narrower than the requested commit for a
    /// partial merge.
    pub fn target(&self) -> &CommitId {
        &self.target
    }

    pub fn requested_target(&self) -> &CommitId {
        &self.requested
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn outcomes(&self) -> &[MergeOutcome] {
        &self.outcomes
    }

    /// Outcomes are caller-editable: resolve conflicts, drop tree conflicts.
    pub fn outcomes_mut(&mut self) -> &mut Vec<MergeOutcome> {
        &mut self.outcomes
    }

    /// Nodes modified on their side: clean merges and conflicts.
    pub fn modified_properties(&self) -> impl Iterator<Item = &MergeOutcome> {
        self.outcomes.iter().filter(|o| {
            matches!(
                o,
                MergeOutcome::Clean { .. }
                    | MergeOutcome::EditConflict { .. }
                    | MergeOutcome::TreeConflict { .. }
            )
        })
    }

    pub fn added_objects(&self) -> impl Iterator<Item = &MergeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MergeOutcome::Add { .. }))
    }

    pub fn deleted_objects(&self) -> impl Iterator<Item = &MergeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MergeOutcome::Delete { .. }))
    }

    /// `true` unless head is the merge base.
    pub fn requires_merge_commit(&self) -> bool {
        self.head != self.base
    }

    /// `true` when a migration forces stopping short of the requested commit.
    pub fn is_partial_merge(&self) -> bool {
        self.required_migrator.is_some()
    }

    pub fn required_migrator(&self) -> Option<&Migrator> {
        self.required_migrator.as_ref()
    }

    pub fn migrators(&self) -> &[Migrator] {
        &self.migrators
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Outcomes that prevent applying: unresolved edits and tree conflicts.
    pub fn blocking_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_blocking()).count()
    }

    pub fn has_conflicts(&self) -> bool {
        self.blocking_count() > 0
    }

    // ---------------------------------------------------------------
    // Apply
    // ---------------------------------------------------------------

    /// Write the merged tree and commit, then move the bound branch.
    ///
    /// Fails without side effects when conflicts remain or the branch moved;
    /// the session can then be fixed up and applied again.
    pub fn apply(&mut self, ctx: &MergeContext<'_>, merger: &Signature) -> MergeResult<CommitId> {
        if self.applied {
            return Err(MergeError::AlreadyApplied);
        }
        let trees = self.outcomes.iter().filter(|o| o.is_tree_conflict()).count();
        if trees > 0 {
            return Err(MergeError::TreeConflictsPresent { count: trees });
        }
        let unresolved: usize = self.outcomes.iter().map(MergeOutcome::unresolved_count).sum();
        if unresolved > 0 {
            return Err(MergeError::UnresolvedConflicts { count: unresolved });
        }
        if let Some(branch) = &self.branch {
            let actual = ctx.refs.branch(branch)?;
            if actual != Some(self.head) {
                return Err(MergeError::BranchMoved {
                    branch: branch.clone(),
                    expected: self.head,
                    actual,
                });
            }
        }

        let result = match self.mode {
            MergeMode::UpToDate => self.head,
            MergeMode::FastForward => self.target,
            MergeMode::Merge | MergeMode::Replay => self.write_commit(ctx.backend, merger)?,
        };
        if let Some(branch) = &self.branch {
            if result != self.head {
                move_branch(ctx.refs, branch, &self.head, &result)?;
            }
        }
        self.applied = true;

        info!(
            head = %self.head.short_hex(),
            result = %result.short_hex(),
            mode = ?self.mode,
            "applied merge"
        );
        Ok(result)
    }

    fn write_commit(&self, backend: Backend<'_>, merger: &Signature) -> MergeResult<CommitId> {
        let store = backend.store;
        let mut builder = TreeBuilder::from_tree(store, &self.head_tree)?;
        for outcome in &self.outcomes {
            match outcome {
                MergeOutcome::Delete { path, .. } => {
                    unstage_node(&mut builder, path);
                }
                other => {
                    if let Some(node) = other.merged_node() {
                        stage_node(&mut builder, backend, other.path(), &node)?;
                    }
                }
            }
        }
        let tree = builder.write(store)?;

        let commit = match &self.replayed {
            Some(original) => {
                if tree == self.head_tree {
                    debug!(
                        commit = %self.target.short_hex(),
                        "replay changes nothing, skipping commit"
                    );
                    return Ok(self.head);
                }
                Commit::new(
                    tree,
                    vec![self.head],
                    original.author.clone(),
                    merger.clone(),
                    original.message.clone(),
                )
            }
            None => Commit::new(
                tree,
                vec![self.head, self.target],
                merger.clone(),
                merger.clone(),
                format!(
                    "Merge {} into {}",
                    self.target.short_hex(),
                    self.branch.as_deref().unwrap_or("HEAD")
                ),
            ),
        };
        Ok(store.write_commit(&commit)?)
    }
}

/// Compare-and-swap a branch, reporting a concurrent move as `BranchMoved`.
pub(crate) fn move_branch(
    refs: &dyn RefStore,
    branch: &str,
    expected: &CommitId,
    target: &CommitId,
) -> MergeResult<()> {
    match refs.advance_branch(branch, Some(expected), target) {
        Ok(()) => Ok(()),
        Err(RefError::Moved { actual, .. }) => Err(MergeError::BranchMoved {
            branch: branch.to_string(),
            expected: *expected,
            actual,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Classify every change on their side against the changes on ours.
fn classify(
    model: &TypeModel,
    theirs: Vec<NodeChange>,
    ours: Vec<NodeChange>,
) -> MergeResult<Vec<MergeOutcome>> {
    let ours: HashMap<NodePath, NodeChange> = ours
        .into_iter()
        .map(|change| (change.path().clone(), change))
        .collect();

    // The shallowest node on `path` (itself included) deleted on our side.
    let deleted_on_our_side = |path: &NodePath| -> Option<(NodePath, Node)> {
        path.ancestors()
            .into_iter()
            .chain(iter::once(path.clone()))
            .find_map(|candidate| match ours.get(&candidate) {
                Some(NodeChange::Deleted { node, .. }) => Some((candidate, node.clone())),
                _ => None,
            })
    };

    let mut outcomes = Vec::new();
    for change in theirs {
        let outcome = match change {
            NodeChange::Modified { path, old, new, .. } => {
                if let Some((deleted_path, deleted_node)) = deleted_on_our_side(&path) {
                    MergeOutcome::TreeConflict {
                        path,
                        node: new,
                        deleted_path,
                        deleted_node,
                    }
                } else if let Some(NodeChange::Modified { new: our_node, .. }) = ours.get(&path) {
                    let node_type = model.get(&new.type_name)?;
                    let (node, conflicts) = merge_node(model, node_type, Some(&old), our_node, &new);
                    if conflicts.is_empty() {
                        MergeOutcome::Clean { path, node }
                    } else {
                        MergeOutcome::EditConflict {
                            path,
                            node,
                            conflicts,
                        }
                    }
                } else {
                    MergeOutcome::Clean { path, node: new }
                }
            }
            NodeChange::Added { path, node } => {
                if let Some((parent, _)) = path.parent().and_then(|p| deleted_on_our_side(&p)) {
                    return Err(MergeError::Unsupported(
                        UnsupportedMerge::AddUnderDeletedParent {
                            path: path.to_string(),
                            parent: parent.to_string(),
                        },
                    ));
                }
                match ours.get(&path) {
                    Some(NodeChange::Added { node: our_node, .. }) => {
                        let node_type = model.get(&node.type_name)?;
                        let (merged, conflicts) = merge_node(model, node_type, None, our_node, &node);
                        if !conflicts.is_empty() {
                            MergeOutcome::EditConflict {
                                path,
                                node: merged,
                                conflicts,
                            }
                        } else if merged != *our_node {
                            MergeOutcome::Clean { path, node: merged }
                        } else {
                            continue;
                        }
                    }
                    _ => MergeOutcome::Add { path, node },
                }
            }
            NodeChange::Deleted { path, node } => match ours.get(&path) {
                Some(NodeChange::Modified { .. }) => {
                    return Err(MergeError::Unsupported(UnsupportedMerge::DeleteModify {
                        path: path.to_string(),
                    }));
                }
                Some(NodeChange::Deleted { .. }) => continue,
                _ => {
                    // Deleting removes the whole folder, our new children included.
                    if let Some(child) = ours.iter().find_map(|(candidate, change)| {
                        let live = !matches!(change, NodeChange::Deleted { .. });
                        (live && candidate.ancestors().contains(&path)).then_some(candidate)
                    }) {
                        return Err(MergeError::Unsupported(
                            UnsupportedMerge::DeleteWithLiveChildren {
                                path: path.to_string(),
                                child: child.to_string(),
                            },
                        ));
                    }
                    MergeOutcome::Delete { path, node }
                }
            },
        };
        debug!(path = %outcome.path(), blocking = outcome.is_blocking(), "classified change");
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
