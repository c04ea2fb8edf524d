//! Slot guards for RAII-style lock management
//!
//! A guard releases its slot when dropped, so early returns and panics do not
//! leave the lock held.

use super::manager::{LockPool, TaskHandle};
use super::types::{LockId, LockResult, TaskId};
use std::fmt;
use tracing::warn;

/// A held lock slot, released when the guard is dropped
#[derive(Debug)]
pub struct SlotGuard<'a> {
    pool: &'a LockPool,
    handle: TaskHandle,
    lock_id: LockId,

    /// Whether the lock has been explicitly released
    released: bool,
}

impl<'a> SlotGuard<'a> {
    pub(crate) fn new(pool: &'a LockPool, handle: TaskHandle, lock_id: LockId) -> Self {
        Self {
            pool,
            handle,
            lock_id,
            released: false,
        }
    }

    /// The held slot
    pub fn lock_id(&self) -> LockId {
        self.lock_id
    }

    /// The task holding the slot
    pub fn task_id(&self) -> TaskId {
        self.handle.task_id()
    }

    /// Explicitly release the lock (normally done automatically on drop)
    pub fn release(mut self) -> LockResult<()> {
        self.released = true;
        self.pool.release(&self.handle, self.lock_id)
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.pool.release(&self.handle, self.lock_id) {
            warn!(lock_id = self.lock_id, error = %e, "Failed to release lock on drop");
        }
    }
}

impl fmt::Display for SlotGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot[{}:{}]", self.lock_id, self.handle.task_id())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    fn pool() -> LockPool {
        LockPool::new(NonZeroUsize::new(2).unwrap())
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let pool = pool();
        let handle = pool.register_task();

        {
            let guard = pool.lock(&handle, 1).await.unwrap();
            assert_eq!(guard.lock_id(), 1);
            assert_eq!(guard.task_id(), handle.task_id());
            assert_eq!(pool.holder(1).unwrap(), Some(handle.task_id()));
        }

        assert_eq!(pool.holder(1).unwrap(), None);
        assert!(pool.snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let pool = pool();
        let handle = pool.register_task();

        let guard = pool.lock(&handle, 0).await.unwrap();
        guard.release().unwrap();

        // Slot is free again
        let again = pool.lock(&handle, 0).await.unwrap();
        drop(again);
        assert!(pool.snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_guard_display() {
        let pool = pool();
        let handle = pool.register_task();
        let guard = pool.lock(&handle, 1).await.unwrap();

        assert_eq!(guard.to_string(), "Slot[1:task-0]");
    }
}
