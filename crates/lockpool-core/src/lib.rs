//! lockpool Core Library
//!
//! This crate provides the core functionality for lockpool, including:
//! - A fixed pool of exclusive locks shared by registered tasks
//! - Deadlock detection over the wait-for graph before any request blocks
//! - RAII slot guards and lock event broadcasting
//! - Runnable scenarios (sequential, ring deadlock, dining philosophers)
//! - Configuration with file persistence

pub mod config;
pub mod error;
pub mod locking;
pub mod scenarios;

#[cfg(test)]
mod config_tests;

pub use error::{Error, Result};
pub use locking::{LockError, LockPool, TaskHandle};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::locking::{LockError, LockId, LockPool, LockResult, SlotGuard, TaskHandle, TaskId};
}
