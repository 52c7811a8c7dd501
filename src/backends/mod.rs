//! Lock backends.
//!
//! Each backend implements atomic "claim if free" against its own medium:
//! - [`DatabaseBackend`]: durable lock table under a table-level file lock
//! - [`CacheBackend`]: compare-and-set on a shared key/value cache
//! - [`SemaphoreBackend`]: System V semaphores, single host only
//!
//! The lock manager only sees the [`LockBackend`] trait and picks one at
//! construction time via [`from_config`].

mod cache;
mod database;
mod semaphore;

pub use cache::{CacheBackend, DEFAULT_CACHE_PREFIX};
pub use database::DatabaseBackend;
pub use semaphore::SemaphoreBackend;

use crate::cache::{MemoryCache, RedisCache, SharedCache};
use crate::config::{BackendKind, CacheDriver, LockConfig};
use crate::error::{LockError, Result};
use crate::locks::{Claim, Owner, ReleaseMode};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// How the lock manager waits for a contended key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Poll the backend, sleeping a random interval in `[min, max]` between
    /// attempts.
    Poll { min: Duration, max: Duration },
    /// The backend blocks natively; the manager never polls it.
    Native,
}

/// Capability every lock backend provides.
pub trait LockBackend: Send + Sync + Debug {
    /// Short backend name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Make one non-blocking, atomic attempt to claim `key` for `owner`.
    fn try_claim(&self, key: &str, owner: Owner, ttl: Option<Duration>) -> Result<Claim>;

    /// Claim `key`, blocking until it is free. Only meaningful for
    /// [`RetryStrategy::Native`] backends; polling backends make a single
    /// attempt.
    fn claim_blocking(&self, key: &str, owner: Owner, ttl: Option<Duration>) -> Result<Claim> {
        self.try_claim(key, owner, ttl)
    }

    /// Release `key`. Returns `false` when `owner` does not hold it and
    /// `mode` is not an override, or when there was nothing to release.
    fn try_release(&self, key: &str, owner: Owner, mode: ReleaseMode) -> Result<bool>;

    /// Whether `key` is currently held by anyone.
    fn peek(&self, key: &str) -> Result<bool>;

    /// Held keys starting with `prefix`, or `None` if this backend cannot
    /// enumerate them.
    fn enumerate(&self, prefix: &str) -> Result<Option<BTreeSet<String>>>;

    /// How contended claims should be retried.
    fn retry_strategy(&self) -> RetryStrategy;

    /// Human-readable description of where the locks live.
    fn location(&self) -> String;
}

/// Build the backend selected by `config`.
pub fn from_config(config: &LockConfig) -> Result<Box<dyn LockBackend>> {
    let backend: Box<dyn LockBackend> = match config.resolved_backend() {
        BackendKind::Database => Box::new(DatabaseBackend::new(config.database_path())),
        BackendKind::Cache => {
            let cache: Arc<dyn SharedCache> = match config.cache.driver {
                CacheDriver::Memory => Arc::new(MemoryCache::new()),
                CacheDriver::Redis => {
                    let url = config.cache.url.as_deref().ok_or_else(|| {
                        LockError::Config("cache.url is required for the redis driver".to_string())
                    })?;
                    Arc::new(RedisCache::connect(url)?)
                }
            };
            Box::new(CacheBackend::with_prefix(cache, &config.cache.prefix))
        }
        BackendKind::Semaphore => Box::new(SemaphoreBackend::new(config.semaphore_dir())?),
        BackendKind::Auto => {
            return Err(LockError::Config(
                "backend selection did not resolve".to_string(),
            ));
        }
    };

    Ok(backend)
}
