//! RAII lock guard implementation.

use super::manager::LockManager;
use super::types::ReleaseMode;
use crate::error::Result;
use tracing::warn;

/// RAII guard for an acquired lock.
///
/// When dropped, the lock is released through its manager. If the release
/// fails, a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    key: String,

    /// Whether the lock has been released manually.
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub(super) fn new(manager: &'a LockManager, key: &str) -> Self {
        Self {
            manager,
            key: key.to_string(),
            released: false,
        }
    }

    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Manually release the lock.
    ///
    /// This is useful when you want to release the lock before the guard
    /// goes out of scope, and want to handle errors explicitly.
    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        self.manager.release(&self.key, ReleaseMode::Owner)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.manager.release(&self.key, ReleaseMode::Owner) {
            Ok(true) => {}
            Ok(false) => warn!(key = %self.key, "lock was no longer held when its guard dropped"),
            Err(e) => warn!(key = %self.key, error = %e, "failed to release lock"),
        }
    }
}
