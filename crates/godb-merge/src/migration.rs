//! Migration planning across a commit range.
//!
//! Walks the commits between two points oldest first and collects the
//! migration nodes each one introduces. One-shot migrations stay bound to the
//! commit that added them; idempotent ones are deferred into a single
//! trailing batch bound to the end of the range.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use godb_dag::CommitGraph;
use godb_diff::{compare_folder, Backend, NodeChange};
use godb_model::{Migration, MIGRATIONS_FOLDER};
use godb_types::{CommitId, NodeId};

use crate::error::{MergeError, MergeResult, UnsupportedMerge};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    Upgrade,
    Downgrade,
}

/// An ordered batch of migrations bound to one commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migrator {
    commit: CommitId,
    direction: MigrationDirection,
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn commit(&self) -> &CommitId {
        &self.commit
    }

    pub fn direction(&self) -> MigrationDirection {
        self.direction
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Returns `true` for the trailing batch of idempotent migrations.
    pub fn is_idempotent_batch(&self) -> bool {
        self.migrations.iter().all(|m| m.idempotent)
    }
}

/// Plans the migrations a range of history requires.
pub struct MigrationPlanner<'a> {
    backend: Backend<'a>,
}

impl<'a> MigrationPlanner<'a> {
    pub fn new(backend: Backend<'a>) -> Self {
        Self { backend }
    }

    /// Migrators needed to bring content at `start` up to `end`.
    ///
    /// Each commit in the range is compared with its first parent, so a
    /// migration reached through several paths is planned once, at the
    /// earliest commit that introduced it. Migrations already present at
    /// `start` are never planned.
    pub fn plan(
        &self,
        start: &CommitId,
        end: &CommitId,
        direction: MigrationDirection,
    ) -> MergeResult<Vec<Migrator>> {
        if direction == MigrationDirection::Downgrade {
            return Err(MergeError::Unsupported(UnsupportedMerge::Downgrade));
        }

        let graph = CommitGraph::new(self.backend.store);
        let start_snapshot = self.backend.snapshot(start)?;
        let mut seen: HashSet<NodeId> = start_snapshot
            .nodes()?
            .into_iter()
            .filter(|(path, _)| path.root_folder() == MIGRATIONS_FOLDER)
            .map(|(path, _)| path.id())
            .collect();

        let mut bound = Vec::new();
        let mut deferred: Vec<Migration> = Vec::new();
        for commit in graph.commits_between(Some(start), end)? {
            let parent = graph.commit(&commit)?.first_parent().copied();
            let before = match parent {
                Some(parent) => self.backend.snapshot(&parent)?,
                None => start_snapshot,
            };
            let after = self.backend.snapshot(&commit)?;

            let mut introduced = Vec::new();
            for change in compare_folder(&before, &after, MIGRATIONS_FOLDER)? {
                let NodeChange::Added { node, .. } = change else {
                    continue;
                };
                let migration = Migration::from_node(&node)?;
                if !seen.insert(migration.id) {
                    continue;
                }
                if migration.idempotent {
                    deferred.push(migration);
                } else {
                    introduced.push(migration);
                }
            }

            if !introduced.is_empty() {
                debug!(
                    commit = %commit.short_hex(),
                    migrations = introduced.len(),
                    "commit introduces migrations"
                );
                bound.push(Migrator {
                    commit,
                    direction,
                    migrations: introduced,
                });
            }
        }

        if !deferred.is_empty() {
            bound.push(Migrator {
                commit: *end,
                direction,
                migrations: deferred,
            });
        }

        info!(
            start = %start.short_hex(),
            end = %end.short_hex(),
            migrators = bound.len(),
            "planned migrations"
        );
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn no_migrations_no_plan() {
        let fx = Fixture::new();
        let base = fx.commit(&[], &[], "base");
        let next = fx.commit(&[fx.table("users")], &[base], "tables");
        let plan = MigrationPlanner::new(fx.backend())
            .plan(&base, &next, MigrationDirection::Upgrade)
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn one_shot_bound_to_commit_idempotent_deferred() {
        let fx = Fixture::new();
        let base = fx.commit(&[], &[], "base");
        let m1 = Migration::new("add column", false);
        let idem = Migration::new("rebuild index", true);
        let c1 = fx.commit(&[fx.migration(&m1), fx.migration(&idem)], &[base], "c1");
        let m2 = Migration::new("rename column", false);
        let c2 = fx.commit(
            &[fx.migration(&m1), fx.migration(&idem), fx.migration(&m2)],
            &[c1],
            "c2",
        );
        let c3 = fx.commit(
            &[fx.migration(&m1), fx.migration(&idem), fx.migration(&m2)],
            &[c2],
            "c3",
        );

        let plan = MigrationPlanner::new(fx.backend())
            .plan(&base, &c3, MigrationDirection::Upgrade)
            .unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].commit(), &c1);
        assert_eq!(plan[0].migrations(), &[m1]);
        assert_eq!(plan[1].commit(), &c2);
        assert_eq!(plan[1].migrations(), &[m2]);
        assert_eq!(plan[2].commit(), &c3);
        assert_eq!(plan[2].migrations(), &[idem]);
        assert!(plan[2].is_idempotent_batch());
    }

    #[test]
    fn migrations_at_start_are_not_replanned() {
        let fx = Fixture::new();
        let m1 = Migration::new("add column", false);
        let base = fx.commit(&[fx.migration(&m1)], &[], "base");
        let next = fx.commit(&[fx.migration(&m1), fx.table("t")], &[base], "next");
        let plan = MigrationPlanner::new(fx.backend())
            .plan(&base, &next, MigrationDirection::Upgrade)
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn downgrade_is_unsupported() {
        let fx = Fixture::new();
        let base = fx.commit(&[], &[], "base");
        let result = MigrationPlanner::new(fx.backend()).plan(
            &base,
            &base,
            MigrationDirection::Downgrade,
        );
        assert!(matches!(
            result,
            Err(MergeError::Unsupported(UnsupportedMerge::Downgrade))
        ));
    }
}
