//! Error types for distlock.
//!
//! Contention and ownership mismatches are not errors: they surface as
//! `Ok(false)` from the lock manager. Everything here means the caller could
//! not even ask the backend, or asked with something malformed.

use crate::exit_codes;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// The backend could not be reached (I/O failure, connection refused, ...).
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// The backend cannot work on this platform.
    #[error("{backend} backend unsupported: {reason}")]
    Unsupported {
        backend: &'static str,
        reason: String,
    },

    /// The lock table exists but could not be parsed.
    #[error("lock table '{}' is corrupt: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    /// Lock keys must be non-empty.
    #[error("invalid lock key: {0:?}")]
    InvalidKey(String),

    /// Owner ids must be non-zero.
    #[error("invalid lock owner id: {0}")]
    InvalidOwner(u32),

    /// Configuration could not be read, parsed, or validated.
    #[error("{0}")]
    Config(String),

    /// Command output could not be written.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// A command could not take or give back the lock it was asked about.
    #[error("{0}")]
    LockFailed(String),
}

impl LockError {
    /// Build a `BackendUnavailable` error from anything displayable.
    pub fn unavailable(backend: &'static str, reason: impl std::fmt::Display) -> Self {
        LockError::BackendUnavailable {
            backend,
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the backend itself could not be used.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            LockError::BackendUnavailable { .. }
                | LockError::Unsupported { .. }
                | LockError::CorruptStore { .. }
        )
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::BackendUnavailable { .. } => exit_codes::BACKEND_FAILURE,
            LockError::Unsupported { .. } => exit_codes::BACKEND_FAILURE,
            LockError::CorruptStore { .. } => exit_codes::BACKEND_FAILURE,
            LockError::InvalidKey(_) => exit_codes::USER_ERROR,
            LockError::InvalidOwner(_) => exit_codes::USER_ERROR,
            LockError::Config(_) => exit_codes::USER_ERROR,
            LockError::Output(_) => exit_codes::USER_ERROR,
            LockError::LockFailed(_) => exit_codes::LOCK_FAILURE,
        }
    }
}

/// Result type alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_have_backend_exit_code() {
        let err = LockError::unavailable("cache", "connection refused");
        assert_eq!(err.exit_code(), exit_codes::BACKEND_FAILURE);
        assert!(err.is_backend_failure());

        let err = LockError::Unsupported {
            backend: "semaphore",
            reason: "no System V IPC".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::BACKEND_FAILURE);
    }

    #[test]
    fn caller_errors_have_user_exit_code() {
        assert_eq!(
            LockError::InvalidKey(String::new()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(LockError::InvalidOwner(0).exit_code(), exit_codes::USER_ERROR);
        let err = LockError::Config("bad".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert!(!err.is_backend_failure());
    }

    #[test]
    fn lock_failures_have_lock_exit_code() {
        let err = LockError::LockFailed("Unable to lock 'feed'.".to_string());
        assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
        assert_eq!(err.to_string(), "Unable to lock 'feed'.");
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = LockError::unavailable("database", "permission denied");
        assert_eq!(
            err.to_string(),
            "database backend unavailable: permission denied"
        );

        let err = LockError::CorruptStore {
            path: PathBuf::from("/tmp/locks.json"),
            reason: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "lock table '/tmp/locks.json' is corrupt: expected value"
        );
    }
}
