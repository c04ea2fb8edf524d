//! Lock pool types and error definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Result type for lock pool operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Index of a lock slot, stable for the lifetime of the pool
pub type LockId = usize;

/// Identity of a registered task
///
/// Dense and monotonically increasing; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(usize);

impl TaskId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of this task in the registry
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lock pool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Lock ID is outside `[0, lock_count)`
    #[error("Invalid lock ID {lock_id}: pool has {lock_count} locks")]
    InvalidLockId { lock_id: LockId, lock_count: usize },

    /// Handle was not issued by this pool
    #[error("Unregistered task: {0}. Register the task with this pool first.")]
    UnregisteredTask(String),

    /// Granting the request would close a cycle in the wait-for graph
    #[error("Deadlock detected: {task} acquiring lock {lock_id} closes cycle {}", format_cycle(.cycle))]
    DeadlockDetected {
        task: TaskId,
        lock_id: LockId,
        cycle: Vec<TaskId>,
    },

    /// Release by a task that does not hold the lock
    #[error("Lock {lock_id} is not held by {task}")]
    NotHeld { task: TaskId, lock_id: LockId },

    /// The slot primitive can no longer be acquired
    #[error("Lock slot {0} is closed")]
    SlotClosed(LockId),
}

impl LockError {
    /// Get error code for this lock error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidLockId { .. } => "E300",
            Self::UnregisteredTask(_) => "E301",
            Self::DeadlockDetected { .. } => "E302",
            Self::NotHeld { .. } => "E303",
            Self::SlotClosed(_) => "E304",
        }
    }

    /// Whether this error came from the deadlock checker
    pub fn is_deadlock(&self) -> bool {
        matches!(self, Self::DeadlockDetected { .. })
    }
}

fn format_cycle(cycle: &[TaskId]) -> String {
    let mut out = String::new();
    for (i, task) in cycle.iter().enumerate() {
        if i > 0 {
            out.push_str(" -> ");
        }
        out.push_str(&task.to_string());
    }
    if let Some(first) = cycle.first() {
        out.push_str(&format!(" -> {}", first));
    }
    out
}

/// Per-slot view of the wait-for graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    /// Slot index
    pub lock_id: LockId,

    /// Tasks holding or waiting on this slot
    pub interested: BTreeSet<TaskId>,

    /// Task currently holding the slot primitive
    pub holder: Option<TaskId>,
}

/// Point-in-time copy of the pool's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub slots: Vec<SlotSnapshot>,

    /// Associated-locks set per task, indexed by task ID
    pub tasks: Vec<BTreeSet<LockId>>,
}

impl PoolSnapshot {
    /// Tasks interested in a slot
    pub fn interested(&self, lock_id: LockId) -> Option<&BTreeSet<TaskId>> {
        self.slots.get(lock_id).map(|s| &s.interested)
    }

    /// Locks associated with a task
    pub fn associated(&self, task: TaskId) -> Option<&BTreeSet<LockId>> {
        self.tasks.get(task.index())
    }

    /// Check that interest sets and associated-locks sets mirror each other
    pub fn is_consistent(&self) -> bool {
        let forward = self.slots.iter().all(|slot| {
            slot.interested.iter().all(|task| {
                self.associated(*task)
                    .is_some_and(|locks| locks.contains(&slot.lock_id))
            })
        });
        let backward = self.tasks.iter().enumerate().all(|(index, locks)| {
            locks.iter().all(|lock_id| {
                self.interested(*lock_id)
                    .is_some_and(|tasks| tasks.contains(&TaskId::new(index)))
            })
        });
        forward && backward
    }

    /// True when no task is interested in any slot
    pub fn is_idle(&self) -> bool {
        self.slots
            .iter()
            .all(|s| s.interested.is_empty() && s.holder.is_none())
    }
}
