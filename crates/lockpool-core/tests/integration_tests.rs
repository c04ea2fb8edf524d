//! lockpool Core Integration Tests

use lockpool_core::locking::{LockError, LockEventType, LockPool, TaskHandle, TaskId};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Barrier, mpsc};

fn pool(lock_count: usize) -> LockPool {
    LockPool::new(NonZeroUsize::new(lock_count).unwrap())
}

async fn wait_for_interest(pool: &LockPool, lock_id: usize, task: TaskId) {
    while !pool
        .snapshot()
        .interested(lock_id)
        .is_some_and(|tasks| tasks.contains(&task))
    {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test]
async fn test_validation_leaves_graph_untouched() {
    let pool = pool(5);
    let other = self::pool(5);
    let local = pool.register_task();
    let foreign = other.register_task();
    let before = pool.snapshot();

    for lock_id in [5, 6, usize::MAX] {
        assert!(matches!(
            pool.acquire(&local, lock_id).await,
            Err(LockError::InvalidLockId { .. })
        ));
        assert!(matches!(
            pool.release(&local, lock_id),
            Err(LockError::InvalidLockId { .. })
        ));
    }

    assert!(matches!(
        pool.acquire(&foreign, 0).await,
        Err(LockError::UnregisteredTask(_))
    ));
    assert!(matches!(
        pool.release(&foreign, 0),
        Err(LockError::UnregisteredTask(_))
    ));

    assert_eq!(pool.snapshot(), before);
}

#[tokio::test]
async fn test_single_task_acquires_every_lock() {
    let pool = pool(5);
    let task = pool.register_task();

    for lock_id in 0..5 {
        pool.acquire(&task, lock_id).await.unwrap();
    }

    // Cannot take the same lock twice
    let err = pool.acquire(&task, 0).await.unwrap_err();
    assert!(err.is_deadlock());

    let snapshot = pool.snapshot();
    assert!(snapshot.is_consistent());
    assert_eq!(snapshot.associated(task.task_id()).unwrap().len(), 5);

    for lock_id in 0..5 {
        pool.release(&task, lock_id).unwrap();
    }

    // Can re-acquire now
    pool.acquire(&task, 0).await.unwrap();
    pool.release(&task, 0).unwrap();
    assert!(pool.snapshot().is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ring_deadlock_and_recovery() {
    let pool = Arc::new(pool(5));
    let barrier = Arc::new(Barrier::new(5));
    let (ready_tx, mut ready_rx) = mpsc::channel::<(usize, TaskId)>(4);
    let mut workers = Vec::new();

    for index in 0..4 {
        let pool = Arc::clone(&pool);
        let barrier = Arc::clone(&barrier);
        let ready_tx = ready_tx.clone();

        workers.push(tokio::spawn(async move {
            let task = pool.register_task();
            pool.acquire(&task, index).await.unwrap();
            ready_tx.send((index, task.task_id())).await.unwrap();

            barrier.wait().await;

            pool.acquire(&task, index + 1).await.unwrap();
            pool.release(&task, index + 1).unwrap();
            pool.release(&task, index).unwrap();
        }));
    }

    let main = pool.register_task();
    pool.acquire(&main, 4).await.unwrap();

    let mut ring = [None; 4];
    for _ in 0..4 {
        let (index, task) = ready_rx.recv().await.unwrap();
        ring[index] = Some(task);
    }
    let ring: Vec<TaskId> = ring.into_iter().flatten().collect();

    barrier.wait().await;
    for (index, task) in ring.iter().enumerate() {
        wait_for_interest(&pool, index + 1, *task).await;
    }

    let before = pool.snapshot();
    assert!(before.is_consistent());

    let err = pool.acquire(&main, 0).await.unwrap_err();
    match err {
        LockError::DeadlockDetected { task, lock_id, cycle } => {
            assert_eq!(task, main.task_id());
            assert_eq!(lock_id, 0);
            let mut expected = vec![main.task_id()];
            expected.extend(ring.iter().copied());
            assert_eq!(cycle, expected);
        }
        other => panic!("expected deadlock, got {other:?}"),
    }

    // Refusal leaves the graph exactly as it was
    assert_eq!(pool.snapshot(), before);

    pool.release(&main, 4).unwrap();
    for worker in workers {
        worker.await.unwrap();
    }
    assert!(pool.snapshot().is_idle());

    // Any task can take any lock again
    let fresh = pool.register_task();
    for lock_id in 0..5 {
        pool.acquire(&fresh, lock_id).await.unwrap();
    }
    for lock_id in 0..5 {
        pool.release(&main, lock_id).unwrap_err();
        pool.release(&fresh, lock_id).unwrap();
    }
    pool.acquire(&main, 0).await.unwrap();
    pool.release(&main, 0).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_locks_make_progress() {
    let pool = Arc::new(pool(4));
    let mut handles = Vec::new();

    for lock_id in 0..4 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let task: TaskHandle = pool.register_task();
            for _ in 0..50 {
                let guard = pool.lock(&task, lock_id).await.unwrap();
                tokio::task::yield_now().await;
                guard.release().unwrap();
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(pool.task_count(), 4);
    assert!(pool.snapshot().is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contended_lock_keeps_graph_consistent() {
    let pool = Arc::new(pool(1));
    let mut handles = Vec::new();

    for _ in 0..8 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let task = pool.register_task();
            for _ in 0..20 {
                pool.acquire(&task, 0).await.unwrap();
                assert_eq!(pool.holder(0).unwrap(), Some(task.task_id()));
                assert!(pool.snapshot().is_consistent());
                pool.release(&task, 0).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert!(pool.snapshot().is_idle());
}

#[tokio::test]
async fn test_deadlock_event_carries_cycle() {
    let pool = pool(2);
    let mut events = pool.subscribe();
    let task = pool.register_task();

    pool.acquire(&task, 1).await.unwrap();
    assert!(pool.acquire(&task, 1).await.is_err());

    let deadlock = std::iter::from_fn(|| events.try_recv().ok())
        .find(|e| e.event_type == LockEventType::DeadlockDetected)
        .expect("deadlock event");
    assert_eq!(deadlock.task_id(), Some(task.task_id().index()));
    assert_eq!(deadlock.lock_id(), Some(1));
}
