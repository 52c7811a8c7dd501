//! Implementation of the `distlock set` command.

use crate::backends::RetryStrategy;
use crate::cli::SetArgs;
use crate::error::{LockError, Result};
use crate::locks::LockManager;
use std::io::Write;
use std::time::Duration;
use tracing::warn;

/// Take a lock by hand.
///
/// Refuses when the lock is already held by anyone, this process included.
pub fn cmd_set(manager: &LockManager, args: &SetArgs, out: &mut impl Write) -> Result<()> {
    if manager.is_locked(&args.lock)? {
        return Err(LockError::LockFailed(format!(
            "'{}' is already set.",
            args.lock
        )));
    }

    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(manager.default_timeout());
    let ttl = match args.ttl {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => manager.default_ttl(),
    };

    if !manager.acquire(&args.lock, timeout, ttl)? {
        return Err(LockError::LockFailed(format!(
            "Unable to lock '{}'.",
            args.lock
        )));
    }

    writeln!(out, "Lock '{}' acquired.", args.lock)?;

    // Native locks belong to the process, and this one is about to exit.
    if manager.backend().retry_strategy() == RetryStrategy::Native {
        warn!(
            lock = %args.lock,
            backend = manager.backend().name(),
            "lock is released when this process exits"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{manager, output};
    use crate::exit_codes;
    use tempfile::TempDir;

    fn args(lock: &str) -> SetArgs {
        SetArgs {
            lock: lock.to_string(),
            timeout: None,
            ttl: None,
        }
    }

    #[test]
    fn sets_free_lock() {
        let temp_dir = TempDir::new().unwrap();
        let locks = manager(temp_dir.path(), 1);

        let mut out = Vec::new();
        cmd_set(&locks, &args("test"), &mut out).unwrap();

        assert_eq!(output(out), "Lock 'test' acquired.\n");
        assert!(manager(temp_dir.path(), 2).is_locked("test").unwrap());
    }

    #[test]
    fn refuses_lock_that_is_already_set() {
        let temp_dir = TempDir::new().unwrap();
        manager(temp_dir.path(), 1)
            .acquire("test", Duration::ZERO, None)
            .unwrap();

        let mut out = Vec::new();
        let err = cmd_set(&manager(temp_dir.path(), 2), &args("test"), &mut out).unwrap_err();

        assert_eq!(err.to_string(), "'test' is already set.");
        assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
        assert!(out.is_empty());
    }

    #[test]
    fn refuses_lock_this_process_already_holds() {
        let temp_dir = TempDir::new().unwrap();
        let locks = manager(temp_dir.path(), 1);
        cmd_set(&locks, &args("test"), &mut Vec::new()).unwrap();

        let err = cmd_set(&locks, &args("test"), &mut Vec::new()).unwrap_err();

        assert_eq!(err.to_string(), "'test' is already set.");
    }

    #[test]
    fn applies_ttl_argument() {
        let temp_dir = TempDir::new().unwrap();
        let locks = manager(temp_dir.path(), 1);
        let set = SetArgs {
            lock: "short".to_string(),
            timeout: Some(0),
            ttl: Some(1),
        };
        cmd_set(&locks, &set, &mut Vec::new()).unwrap();

        std::thread::sleep(Duration::from_millis(1100));

        assert!(!manager(temp_dir.path(), 2).is_locked("short").unwrap());
    }

    #[test]
    fn rejects_empty_lock_name() {
        let temp_dir = TempDir::new().unwrap();
        let err = cmd_set(&manager(temp_dir.path(), 1), &args(""), &mut Vec::new()).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }
}
