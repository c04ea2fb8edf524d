//! Wait-for graph and deadlock checker
//!
//! The graph is bipartite: every lock slot keeps the set of tasks interested
//! in it (holding or waiting), and every task keeps the set of locks it is
//! interested in. A task `X` waits for task `Y` when `X` is interested in a
//! lock that `Y` is also interested in.
//!
//! The graph is not synchronized on its own. [`LockPool`](super::LockPool)
//! keeps it behind the metadata mutex, so a check never races a mutation.

use super::types::{LockId, PoolSnapshot, SlotSnapshot, TaskId};
use std::collections::BTreeSet;
use tracing::trace;

/// Interest bookkeeping for a fixed set of slots and a growing set of tasks
#[derive(Debug, Clone)]
pub(crate) struct WaitForGraph {
    /// Tasks interested in each slot, indexed by lock ID
    interest: Vec<BTreeSet<TaskId>>,

    /// Locks each task is interested in, indexed by task ID
    associated: Vec<BTreeSet<LockId>>,

    /// Task holding each slot primitive
    holders: Vec<Option<TaskId>>,
}

impl WaitForGraph {
    pub(crate) fn new(lock_count: usize) -> Self {
        Self {
            interest: vec![BTreeSet::new(); lock_count],
            associated: Vec::new(),
            holders: vec![None; lock_count],
        }
    }

    pub(crate) fn task_count(&self) -> usize {
        self.associated.len()
    }

    /// Append a task with no associated locks
    pub(crate) fn register_task(&mut self) -> TaskId {
        let id = TaskId::new(self.associated.len());
        self.associated.push(BTreeSet::new());
        id
    }

    pub(crate) fn contains_task(&self, task: TaskId) -> bool {
        task.index() < self.associated.len()
    }

    pub(crate) fn holder(&self, lock_id: LockId) -> Option<TaskId> {
        self.holders.get(lock_id).copied().flatten()
    }

    pub(crate) fn set_holder(&mut self, lock_id: LockId, holder: Option<TaskId>) {
        if let Some(slot) = self.holders.get_mut(lock_id) {
            *slot = holder;
        }
    }

    /// Record that `task` wants (or holds) `lock_id`, on both sides
    pub(crate) fn commit(&mut self, task: TaskId, lock_id: LockId) {
        self.interest[lock_id].insert(task);
        self.associated[task.index()].insert(lock_id);
    }

    /// Drop the interest of `task` in `lock_id`, on both sides
    pub(crate) fn clear(&mut self, task: TaskId, lock_id: LockId) {
        self.interest[lock_id].remove(&task);
        self.associated[task.index()].remove(&lock_id);
    }

    /// Whether `task` acquiring `lock_id` would close a cycle
    #[cfg(test)]
    pub(crate) fn would_deadlock(&self, task: TaskId, lock_id: LockId) -> bool {
        self.find_cycle(task, lock_id).is_some()
    }

    /// Search for a cycle closed by `task` acquiring `lock_id`
    ///
    /// Returns the chain of tasks walked from the acquirer to the task whose
    /// lock leads back to it. A task already interested in `lock_id` is
    /// reported at depth 0 with a chain of just itself.
    pub(crate) fn find_cycle(&self, task: TaskId, lock_id: LockId) -> Option<Vec<TaskId>> {
        let mut path = Vec::new();
        if self.has_cycle(task, task, lock_id, &BTreeSet::new(), &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn has_cycle(
        &self,
        acquirer: TaskId,
        current: TaskId,
        lock_id: LockId,
        visited: &BTreeSet<TaskId>,
        path: &mut Vec<TaskId>,
    ) -> bool {
        trace!(acquirer = %acquirer, current = %current, lock_id, "Checking for deadlock");

        path.push(current);

        if self.interest[lock_id].contains(&acquirer) {
            return true;
        }

        let mut visited = visited.clone();
        visited.insert(current);

        for other in &self.interest[lock_id] {
            if visited.contains(other) {
                continue;
            }

            for other_lock in &self.associated[other.index()] {
                if *other_lock == lock_id {
                    continue;
                }

                if self.has_cycle(acquirer, *other, *other_lock, &visited, path) {
                    return true;
                }
            }
        }

        path.pop();
        false
    }

    pub(crate) fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            slots: self
                .interest
                .iter()
                .zip(&self.holders)
                .enumerate()
                .map(|(lock_id, (interested, holder))| SlotSnapshot {
                    lock_id,
                    interested: interested.clone(),
                    holder: *holder,
                })
                .collect(),
            tasks: self.associated.clone(),
        }
    }
}
