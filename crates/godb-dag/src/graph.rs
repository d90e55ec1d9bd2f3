//! Traversal algorithms over the commit DAG.
//!
//! [`CommitGraph`] reads commits lazily from an object store and caches the
//! ones it has seen. Parent links always point at older commits, so the graph
//! is acyclic by construction; the topological walk still reports a cycle
//! rather than silently dropping commits.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use tracing::debug;

use godb_store::{Commit, ObjectStore};
use godb_types::CommitId;

use crate::error::{DagError, DagResult};

/// A read-only view of the commit DAG stored in an [`ObjectStore`].
pub struct CommitGraph<'a> {
    store: &'a dyn ObjectStore,
    cache: RefCell<HashMap<CommitId, Commit>>,
}

impl<'a> CommitGraph<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Read a commit, going to the store only on the first request.
    pub fn commit(&self, id: &CommitId) -> DagResult<Commit> {
        if let Some(commit) = self.cache.borrow().get(id) {
            return Ok(commit.clone());
        }
        let commit = self.store.read_commit(id)?;
        self.cache.borrow_mut().insert(*id, commit.clone());
        Ok(commit)
    }

    pub fn parents(&self, id: &CommitId) -> DagResult<Vec<CommitId>> {
        Ok(self.commit(id)?.parents)
    }

    /// Committer timestamp used to break ordering ties.
    fn time(&self, id: &CommitId) -> DagResult<i64> {
        Ok(self.commit(id)?.committer.when.timestamp())
    }

    // ---------------------------------------------------------------
    // Ancestry
    // ---------------------------------------------------------------

    /// Every commit reachable from `id`, including `id` itself.
    pub fn ancestors(&self, id: &CommitId) -> DagResult<HashSet<CommitId>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(*id);
        queue.push_back(*id);

        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        Ok(visited)
    }

    /// Returns `true` if `ancestor` is reachable from `descendant`.
    ///
    /// A commit is its own ancestor.
    pub fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> DagResult<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([*descendant]);

        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if parent == *ancestor {
                    return Ok(true);
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        Ok(false)
    }

    /// The best common ancestor of `a` and `b`.
    ///
    /// Candidates are the common ancestors not reachable from any other common
    /// ancestor. When history crosses and several remain, the one with the
    /// latest committer time wins, then the highest id. Returns `None` when the
    /// histories are unrelated.
    pub fn merge_base(&self, a: &CommitId, b: &CommitId) -> DagResult<Option<CommitId>> {
        if a == b {
            return Ok(Some(*a));
        }

        let ours = self.ancestors(a)?;
        let theirs = self.ancestors(b)?;
        let common: HashSet<CommitId> = ours.intersection(&theirs).copied().collect();
        if common.is_empty() {
            debug!(a = %a.short_hex(), b = %b.short_hex(), "no merge base");
            return Ok(None);
        }

        let mut dominated = HashSet::new();
        for id in &common {
            for parent in self.parents(id)? {
                if !dominated.contains(&parent) {
                    dominated.extend(self.ancestors(&parent)?);
                }
            }
        }

        let mut best: Option<(i64, CommitId)> = None;
        for id in common.difference(&dominated) {
            let key = (self.time(id)?, *id);
            if best.map_or(true, |current| key > current) {
                best = Some(key);
            }
        }

        let base = best.map(|(_, id)| id);
        if let Some(base) = &base {
            debug!(
                a = %a.short_hex(),
                b = %b.short_hex(),
                base = %base.short_hex(),
                "selected merge base"
            );
        }
        Ok(base)
    }

    // ---------------------------------------------------------------
    // Topological walk
    // ---------------------------------------------------------------

    /// Commits reachable from `end` but not from `start`, oldest first.
    ///
    /// Parents always precede their children. Among commits whose parents
    /// have all been emitted, the earliest committer time goes first, then the
    /// lowest id. `start = None` walks the whole history of `end`.
    pub fn commits_between(
        &self,
        start: Option<&CommitId>,
        end: &CommitId,
    ) -> DagResult<Vec<CommitId>> {
        let excluded = match start {
            Some(start) => self.ancestors(start)?,
            None => HashSet::new(),
        };
        if excluded.contains(end) {
            return Ok(Vec::new());
        }

        let mut members = HashSet::from([*end]);
        let mut queue = VecDeque::from([*end]);
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(&current)? {
                if !excluded.contains(&parent) && members.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        // Kahn's algorithm restricted to `members`.
        let mut pending: HashMap<CommitId, usize> = HashMap::new();
        let mut children: HashMap<CommitId, Vec<CommitId>> = HashMap::new();
        let mut ready = BinaryHeap::new();
        for id in &members {
            let inside: Vec<CommitId> = self
                .parents(id)?
                .into_iter()
                .filter(|p| members.contains(p))
                .collect();
            if inside.is_empty() {
                ready.push(Reverse((self.time(id)?, *id)));
            }
            pending.insert(*id, inside.len());
            for parent in inside {
                children.entry(parent).or_default().push(*id);
            }
        }

        let mut order = Vec::with_capacity(members.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id);
            for child in children.get(&id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse((self.time(child)?, *child)));
                    }
                }
            }
        }

        if order.len() != members.len() {
            let emitted: HashSet<&CommitId> = order.iter().collect();
            let stuck = members
                .iter()
                .find(|id| !emitted.contains(id))
                .copied()
                .unwrap_or(*end);
            return Err(DagError::CycleDetected(stuck));
        }

        debug!(
            start = ?start.map(|s| s.short_hex()),
            end = %end.short_hex(),
            count = order.len(),
            "walked commit range"
        );
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use godb_store::InMemoryObjectStore;
    use godb_types::{ObjectId, Signature};
    use proptest::prelude::*;

    fn commit_at(store: &InMemoryObjectStore, parents: &[CommitId], t: i64, msg: &str) -> CommitId {
        let when = Utc.timestamp_opt(1_700_000_000 + t, 0).unwrap();
        let sig = Signature::at("Ada", "ada@example.com", when);
        store
            .write_commit(&Commit::new(
                ObjectId::null(),
                parents.to_vec(),
                sig.clone(),
                sig,
                msg,
            ))
            .unwrap()
    }

    /// a <- b <- c
    fn linear(store: &InMemoryObjectStore) -> (CommitId, CommitId, CommitId) {
        let a = commit_at(store, &[], 0, "a");
        let b = commit_at(store, &[a], 1, "b");
        let c = commit_at(store, &[b], 2, "c");
        (a, b, c)
    }

    // ---- Ancestry ----

    #[test]
    fn ancestors_include_self() {
        let store = InMemoryObjectStore::new();
        let (a, b, c) = linear(&store);
        let graph = CommitGraph::new(&store);
        assert_eq!(graph.ancestors(&c).unwrap(), HashSet::from([a, b, c]));
        assert_eq!(graph.ancestors(&a).unwrap(), HashSet::from([a]));
    }

    #[test]
    fn is_ancestor_follows_parents_only() {
        let store = InMemoryObjectStore::new();
        let (a, _, c) = linear(&store);
        let graph = CommitGraph::new(&store);
        assert!(graph.is_ancestor(&a, &c).unwrap());
        assert!(graph.is_ancestor(&c, &c).unwrap());
        assert!(!graph.is_ancestor(&c, &a).unwrap());
    }

    #[test]
    fn missing_commit_is_a_store_error() {
        let store = InMemoryObjectStore::new();
        let graph = CommitGraph::new(&store);
        assert!(matches!(
            graph.parents(&ObjectId::from_bytes(b"ghost")),
            Err(DagError::Store(_))
        ));
    }

    // ---- Merge base ----

    #[test]
    fn merge_base_of_diverged_branches() {
        let store = InMemoryObjectStore::new();
        let (_, b, _) = linear(&store);
        let ours = commit_at(&store, &[b], 3, "ours");
        let theirs = commit_at(&store, &[b], 4, "theirs");
        let graph = CommitGraph::new(&store);
        assert_eq!(graph.merge_base(&ours, &theirs).unwrap(), Some(b));
    }

    #[test]
    fn merge_base_when_one_side_contains_the_other() {
        let store = InMemoryObjectStore::new();
        let (a, _, c) = linear(&store);
        let graph = CommitGraph::new(&store);
        assert_eq!(graph.merge_base(&a, &c).unwrap(), Some(a));
        assert_eq!(graph.merge_base(&c, &c).unwrap(), Some(c));
    }

    #[test]
    fn merge_base_after_previous_merge() {
        // root <- x <- m (merge of x and y) <- ours
        //      \- y <----------------------- theirs
        let store = InMemoryObjectStore::new();
        let root = commit_at(&store, &[], 0, "root");
        let x = commit_at(&store, &[root], 1, "x");
        let y = commit_at(&store, &[root], 2, "y");
        let m = commit_at(&store, &[x, y], 3, "merge");
        let ours = commit_at(&store, &[m], 4, "ours");
        let theirs = commit_at(&store, &[y], 5, "theirs");
        let graph = CommitGraph::new(&store);
        assert_eq!(graph.merge_base(&ours, &theirs).unwrap(), Some(y));
    }

    #[test]
    fn criss_cross_picks_latest_candidate() {
        let store = InMemoryObjectStore::new();
        let root = commit_at(&store, &[], 0, "root");
        let p = commit_at(&store, &[root], 1, "p");
        let q = commit_at(&store, &[root], 2, "q");
        let left = commit_at(&store, &[p, q], 3, "left");
        let right = commit_at(&store, &[q, p], 4, "right");
        let graph = CommitGraph::new(&store);
        assert_eq!(graph.merge_base(&left, &right).unwrap(), Some(q));
    }

    #[test]
    fn unrelated_histories_have_no_base() {
        let store = InMemoryObjectStore::new();
        let a = commit_at(&store, &[], 0, "a");
        let b = commit_at(&store, &[], 1, "b");
        let graph = CommitGraph::new(&store);
        assert_eq!(graph.merge_base(&a, &b).unwrap(), None);
    }

    // ---- Topological walk ----

    #[test]
    fn commits_between_excludes_start_history() {
        let store = InMemoryObjectStore::new();
        let (a, b, c) = linear(&store);
        let graph = CommitGraph::new(&store);
        assert_eq!(graph.commits_between(Some(&a), &c).unwrap(), vec![b, c]);
        assert_eq!(graph.commits_between(None, &c).unwrap(), vec![a, b, c]);
        assert!(graph.commits_between(Some(&c), &a).unwrap().is_empty());
    }

    #[test]
    fn commits_between_orders_branches_by_time() {
        let store = InMemoryObjectStore::new();
        let root = commit_at(&store, &[], 0, "root");
        let late = commit_at(&store, &[root], 5, "late");
        let early = commit_at(&store, &[root], 2, "early");
        let merge = commit_at(&store, &[late, early], 6, "merge");
        let graph = CommitGraph::new(&store);
        assert_eq!(
            graph.commits_between(Some(&root), &merge).unwrap(),
            vec![early, late, merge]
        );
    }

    proptest! {
        #[test]
        fn walk_is_topological_and_base_is_common(
            shape in proptest::collection::vec(
                (any::<prop::sample::Index>(), any::<prop::sample::Index>(), any::<bool>()),
                1..24,
            ),
            pick in (any::<prop::sample::Index>(), any::<prop::sample::Index>()),
        ) {
            let store = InMemoryObjectStore::new();
            let mut ids = vec![commit_at(&store, &[], 0, "root")];
            for (i, (p1, p2, merge)) in shape.iter().enumerate() {
                let first = ids[p1.index(ids.len())];
                let mut parents = vec![first];
                let second = ids[p2.index(ids.len())];
                if *merge && second != first {
                    parents.push(second);
                }
                // Reverse time order on purpose: ordering must follow parents.
                ids.push(commit_at(&store, &parents, 100 - i as i64, &format!("c{i}")));
            }
            let graph = CommitGraph::new(&store);

            let tip = *ids.last().unwrap();
            let order = graph.commits_between(None, &tip).unwrap();
            let position: HashMap<CommitId, usize> =
                order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
            prop_assert_eq!(order.len(), graph.ancestors(&tip).unwrap().len());
            for id in &order {
                for parent in graph.parents(id).unwrap() {
                    prop_assert!(position[&parent] < position[id]);
                }
            }

            let a = ids[pick.0.index(ids.len())];
            let b = ids[pick.1.index(ids.len())];
            let base = graph.merge_base(&a, &b).unwrap().unwrap();
            prop_assert!(graph.is_ancestor(&base, &a).unwrap());
            prop_assert!(graph.is_ancestor(&base, &b).unwrap());
        }
    }
}
