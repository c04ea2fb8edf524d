//! Lock pool events
//!
//! Events published by a [`LockPool`](super::LockPool) as tasks register,
//! request, acquire and release locks.

use super::types::{LockId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of lock event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventType {
    /// A task joined the pool
    TaskRegistered,
    /// A request passed the deadlock check and is waiting on its slot
    LockRequested,
    /// A lock was acquired
    LockAcquired,
    /// A lock was released
    LockReleased,
    /// A request was refused because it would close a cycle
    DeadlockDetected,
}

impl LockEventType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskRegistered => "task_registered",
            Self::LockRequested => "lock_requested",
            Self::LockAcquired => "lock_acquired",
            Self::LockReleased => "lock_released",
            Self::DeadlockDetected => "deadlock_detected",
        }
    }
}

impl std::fmt::Display for LockEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A lock pool event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// The pool that emitted the event
    pub aggregate_id: Uuid,
    /// Type of event
    pub event_type: LockEventType,
    /// Event data
    pub data: Option<serde_json::Value>,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl LockEvent {
    /// Create a new lock event
    pub fn new(pool_id: Uuid, event_type: LockEventType, data: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: pool_id,
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    /// Create a task registered event
    pub fn task_registered(pool_id: Uuid, task: TaskId) -> Self {
        let data = serde_json::json!({ "task_id": task });
        Self::new(pool_id, LockEventType::TaskRegistered, Some(data))
    }

    /// Create a lock requested event
    pub fn lock_requested(pool_id: Uuid, task: TaskId, lock_id: LockId) -> Self {
        let data = serde_json::json!({
            "task_id": task,
            "lock_id": lock_id,
        });
        Self::new(pool_id, LockEventType::LockRequested, Some(data))
    }

    /// Create a lock acquired event
    pub fn lock_acquired(pool_id: Uuid, task: TaskId, lock_id: LockId, waited_ms: u64) -> Self {
        let data = serde_json::json!({
            "task_id": task,
            "lock_id": lock_id,
            "waited_ms": waited_ms,
        });
        Self::new(pool_id, LockEventType::LockAcquired, Some(data))
    }

    /// Create a lock released event
    pub fn lock_released(pool_id: Uuid, task: TaskId, lock_id: LockId) -> Self {
        let data = serde_json::json!({
            "task_id": task,
            "lock_id": lock_id,
        });
        Self::new(pool_id, LockEventType::LockReleased, Some(data))
    }

    /// Create a deadlock detected event
    pub fn deadlock_detected(pool_id: Uuid, task: TaskId, lock_id: LockId, cycle: &[TaskId]) -> Self {
        let data = serde_json::json!({
            "task_id": task,
            "lock_id": lock_id,
            "cycle": cycle,
        });
        Self::new(pool_id, LockEventType::DeadlockDetected, Some(data))
    }

    /// Task the event is about, if recorded
    pub fn task_id(&self) -> Option<usize> {
        self.field("task_id")
    }

    /// Lock the event is about, if recorded
    pub fn lock_id(&self) -> Option<LockId> {
        self.field("lock_id")
    }

    fn field(&self, key: &str) -> Option<usize> {
        self.data
            .as_ref()?
            .get(key)?
            .as_u64()
            .map(|v| v as usize)
    }
}
