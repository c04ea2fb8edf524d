//! Error types for lockpool

use crate::locking::LockError;
use thiserror::Error;

/// Result type alias using lockpool's Error
pub type Result<T> = std::result::Result<T, Error>;

/// lockpool error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Lock errors (E300-E399)
    #[error(transparent)]
    Lock(#[from] LockError),

    // Scenario errors (E400-E499)
    #[error("Scenario '{0}' failed: {1}")]
    ScenarioFailed(String, String),

    #[error("Task panicked or was cancelled: {0}")]
    TaskJoin(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lock(e) => e.code(),
            Self::ScenarioFailed(..) => "E400",
            Self::TaskJoin(_) => "E401",
            Self::ConfigError(_) => "E600",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Lock(LockError::InvalidLockId { lock_count, .. }) => {
                Some(format!("Use a lock ID between 0 and {}", lock_count.saturating_sub(1)))
            }
            Self::Lock(LockError::UnregisteredTask(_)) => {
                Some("Use a handle returned by this pool's register_task".to_string())
            }
            Self::Lock(LockError::DeadlockDetected { .. }) => {
                Some("Release held locks or acquire in a consistent order before retrying".to_string())
            }
            Self::ConfigError(_) => Some("lockpool config list".to_string()),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TaskJoin(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::TaskId;

    #[test]
    fn test_lock_error_passes_through_code() {
        let error: Error = LockError::InvalidLockId {
            lock_id: 7,
            lock_count: 5,
        }
        .into();
        assert_eq!(error.code(), "E300");
        assert_eq!(error.suggestion(), Some("Use a lock ID between 0 and 4".to_string()));
        assert!(error.to_string().contains("7"));
    }

    #[test]
    fn test_deadlock_suggestion() {
        let error = Error::from(LockError::DeadlockDetected {
            task: TaskId::new(1),
            lock_id: 0,
            cycle: vec![TaskId::new(1)],
        });
        assert_eq!(error.code(), "E302");
        assert!(error.suggestion().unwrap().contains("consistent order"));
    }

    #[test]
    fn test_config_error() {
        let error = Error::ConfigError("lock_count must be positive".to_string());
        assert_eq!(error.code(), "E600");
        assert_eq!(error.suggestion(), Some("lockpool config list".to_string()));
        assert!(error.to_string().contains("lock_count"));
    }

    #[test]
    fn test_not_held_has_no_suggestion() {
        let error = Error::from(LockError::NotHeld {
            task: TaskId::new(0),
            lock_id: 1,
        });
        assert_eq!(error.code(), "E303");
        assert_eq!(error.suggestion(), None);
    }
}
