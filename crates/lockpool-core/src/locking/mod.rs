//! Deadlock-detecting lock pool
//!
//! This module provides a fixed pool of exclusive locks shared by any number
//! of logical tasks. Every acquisition is checked against a wait-for graph
//! before it is allowed to block, and refused if it would close a cycle.
//!
//! # Architecture
//!
//! - **Lock Pool**: `LockPool` owns the slots, the task registry and the
//!   metadata mutex that serializes all graph reads and writes
//! - **Deadlock Checker**: depth-first search over the task/lock graph
//! - **Handles**: `TaskHandle` capabilities issued by `register_task`
//! - **Guards**: RAII-style slot guards for automatic release
//! - **Events**: `LockEvent` broadcast for every lock transition
//!
//! # Example
//!
//! ```ignore
//! use lockpool_core::locking::LockPool;
//!
//! let pool = LockPool::new(NonZeroUsize::new(5).unwrap());
//! let task = pool.register_task();
//!
//! pool.acquire(&task, 0).await?;
//! // ... work with resource 0 ...
//! pool.release(&task, 0)?;
//! ```

mod detector;
pub mod event;
pub mod guard;
pub mod manager;
pub mod types;

// Re-export main types
pub use event::{LockEvent, LockEventType};
pub use guard::SlotGuard;
pub use manager::{LockPool, TaskHandle};
pub use types::{LockError, LockId, LockResult, PoolSnapshot, SlotSnapshot, TaskId};
