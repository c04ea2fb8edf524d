//! Lock pool with deadlock detection
//!
//! The pool owns a fixed array of exclusive lock slots and an append-only
//! registry of tasks. Before an acquisition is allowed to block, the pool
//! checks its wait-for graph and refuses any request that would close a
//! cycle.
//!
//! Acquisition happens in two phases:
//! 1. Under the metadata mutex the request is checked and, if safe, the
//!    task's interest in the slot is committed to the graph.
//! 2. With the metadata mutex released, the task waits on the slot itself.
//!
//! Between the two phases the interest is already visible to other tasks'
//! checks. The checker therefore treats interest as "holding or waiting" and
//! can refuse a request that would not actually have deadlocked. It never
//! lets a request through that closes a cycle of recorded interest.

use super::event::LockEvent;
use super::guard::SlotGuard;
use super::detector::WaitForGraph;
use super::types::{LockError, LockId, LockResult, PoolSnapshot, TaskId};
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default buffer for the event channel
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Capability returned by [`LockPool::register_task`]
///
/// Every acquire and release on behalf of a task must present its handle.
/// Handles are bound to the pool that issued them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pool_id: Uuid,
    task: TaskId,
}

impl TaskHandle {
    /// Identity of the task this handle speaks for
    pub fn task_id(&self) -> TaskId {
        self.task
    }
}

/// Fixed pool of exclusive locks guarded by a deadlock checker
#[derive(Debug)]
pub struct LockPool {
    /// Identity used to reject handles from other pools
    id: Uuid,

    /// One single-permit semaphore per slot
    slots: Box<[Semaphore]>,

    /// Metadata lock over interest sets, associated locks and holders
    graph: Mutex<WaitForGraph>,

    /// Event fan-out; sends are dropped when nobody listens
    events: broadcast::Sender<LockEvent>,
}

impl LockPool {
    /// Create a pool with `lock_count` slots
    pub fn new(lock_count: NonZeroUsize) -> Self {
        Self::build(lock_count.get(), DEFAULT_EVENT_CAPACITY)
    }

    /// Create a pool from configuration
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        config.validate().map_err(|e| Error::ConfigError(e.to_string()))?;
        Ok(Self::build(config.lock_count, config.event_capacity))
    }

    fn build(lock_count: usize, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        let id = Uuid::new_v4();

        debug!(pool_id = %id, lock_count, "Created lock pool");

        Self {
            id,
            slots: (0..lock_count).map(|_| Semaphore::new(1)).collect(),
            graph: Mutex::new(WaitForGraph::new(lock_count)),
            events,
        }
    }

    /// Pool identity
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of lock slots
    pub fn lock_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of tasks registered so far
    pub fn task_count(&self) -> usize {
        self.graph().task_count()
    }

    /// Register a new task and return its handle
    pub fn register_task(&self) -> TaskHandle {
        let task = self.graph().register_task();

        debug!(pool_id = %self.id, task = %task, "Registered task");
        self.emit(LockEvent::task_registered(self.id, task));

        TaskHandle {
            pool_id: self.id,
            task,
        }
    }

    /// Acquire a lock on behalf of a task
    ///
    /// Fails fast with [`LockError::DeadlockDetected`] if waiting for the lock
    /// would close a cycle; the graph is left untouched in that case.
    /// Otherwise waits until the slot is free. There is no timeout.
    ///
    /// Dropping the returned future while it waits withdraws the request.
    pub async fn acquire(&self, handle: &TaskHandle, lock_id: LockId) -> LockResult<()> {
        self.check_lock_id(lock_id)?;

        let task = {
            let mut graph = self.graph();
            let task = self.check_handle(&graph, handle)?;

            if let Some(cycle) = graph.find_cycle(task, lock_id) {
                drop(graph);

                warn!(
                    pool_id = %self.id,
                    task = %task,
                    lock_id,
                    cycle_len = cycle.len(),
                    "Deadlock detected, refusing lock"
                );
                self.emit(LockEvent::deadlock_detected(self.id, task, lock_id, &cycle));

                return Err(LockError::DeadlockDetected {
                    task,
                    lock_id,
                    cycle,
                });
            }

            graph.commit(task, lock_id);
            task
        };

        debug!(pool_id = %self.id, task = %task, lock_id, "No deadlock detected, waiting on lock");
        self.emit(LockEvent::lock_requested(self.id, task, lock_id));

        let pending = PendingInterest {
            pool: self,
            task,
            lock_id,
            armed: true,
        };
        let start = Instant::now();

        let permit = match self.slots[lock_id].acquire().await {
            Ok(permit) => permit,
            Err(_) => return Err(LockError::SlotClosed(lock_id)),
        };
        permit.forget();
        pending.disarm();

        self.graph().set_holder(lock_id, Some(task));

        let waited_ms = start.elapsed().as_millis() as u64;
        info!(pool_id = %self.id, task = %task, lock_id, waited_ms, "Lock acquired");
        self.emit(LockEvent::lock_acquired(self.id, task, lock_id, waited_ms));

        Ok(())
    }

    /// Acquire a lock and return a guard that releases it on drop
    pub async fn lock(&self, handle: &TaskHandle, lock_id: LockId) -> LockResult<SlotGuard<'_>> {
        self.acquire(handle, lock_id).await?;
        Ok(SlotGuard::new(self, handle.clone(), lock_id))
    }

    /// Release a lock held by a task
    ///
    /// Only the task currently holding the slot may release it; anyone else
    /// gets [`LockError::NotHeld`] and nothing changes.
    pub fn release(&self, handle: &TaskHandle, lock_id: LockId) -> LockResult<()> {
        self.check_lock_id(lock_id)?;

        let task = {
            let mut graph = self.graph();
            let task = self.check_handle(&graph, handle)?;

            if graph.holder(lock_id) != Some(task) {
                return Err(LockError::NotHeld { task, lock_id });
            }

            graph.clear(task, lock_id);
            graph.set_holder(lock_id, None);
            task
        };

        self.slots[lock_id].add_permits(1);

        debug!(pool_id = %self.id, task = %task, lock_id, "Lock released");
        self.emit(LockEvent::lock_released(self.id, task, lock_id));

        Ok(())
    }

    /// Task currently holding a slot, if any
    pub fn holder(&self, lock_id: LockId) -> LockResult<Option<TaskId>> {
        self.check_lock_id(lock_id)?;
        Ok(self.graph().holder(lock_id))
    }

    /// Copy of the wait-for graph taken under the metadata lock
    pub fn snapshot(&self) -> PoolSnapshot {
        self.graph().snapshot()
    }

    /// Subscribe to lock events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.events.subscribe()
    }

    // ========== Internal Methods ==========

    fn graph(&self) -> MutexGuard<'_, WaitForGraph> {
        // Graph updates never panic halfway, so a poisoned lock is still consistent
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_lock_id(&self, lock_id: LockId) -> LockResult<()> {
        if lock_id >= self.slots.len() {
            return Err(LockError::InvalidLockId {
                lock_id,
                lock_count: self.slots.len(),
            });
        }
        Ok(())
    }

    fn check_handle(&self, graph: &WaitForGraph, handle: &TaskHandle) -> LockResult<TaskId> {
        if handle.pool_id != self.id || !graph.contains_task(handle.task) {
            return Err(LockError::UnregisteredTask(handle.task.to_string()));
        }
        Ok(handle.task)
    }

    fn emit(&self, event: LockEvent) {
        let _ = self.events.send(event);
    }
}

/// Interest committed by an acquire that has not been granted yet
///
/// Withdraws the interest if the acquire is abandoned before the slot is
/// granted.
struct PendingInterest<'a> {
    pool: &'a LockPool,
    task: TaskId,
    lock_id: LockId,
    armed: bool,
}

impl PendingInterest<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingInterest<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(task = %self.task, lock_id = self.lock_id, "Withdrawing abandoned lock request");
            self.pool.graph().clear(self.task, self.lock_id);
        }
    }
}
