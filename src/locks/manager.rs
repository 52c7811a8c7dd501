//! The lock manager: retry loop, timeouts, TTLs and local bookkeeping on top
//! of a backend.

use super::guard::LockGuard;
use super::tracker::OwnershipTracker;
use super::types::{Claim, Owner, ReleaseMode, validate_key};
use crate::backends::{self, LockBackend, RetryStrategy};
use crate::config::LockConfig;
use crate::error::Result;
use rand::Rng;
use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default time to keep retrying a contended key.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default lifetime of a claim that is never released.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Public entry point for named cross-process locks.
///
/// One manager is one owner: everything it acquires is tracked locally so
/// [`release_all`](Self::release_all) can give it all back at the end of a
/// unit of work.
#[derive(Debug)]
pub struct LockManager {
    backend: Box<dyn LockBackend>,
    owner: Owner,
    tracker: OwnershipTracker,
    default_timeout: Duration,
    default_ttl: Option<Duration>,
    backoff: Option<(Duration, Duration)>,
}

impl LockManager {
    /// Manage locks on `backend` as the current process.
    pub fn new(backend: Box<dyn LockBackend>) -> Self {
        Self::with_owner(backend, Owner::current())
    }

    /// Manage locks on `backend` under an explicit owner identity.
    pub fn with_owner(backend: Box<dyn LockBackend>, owner: Owner) -> Self {
        Self {
            backend,
            owner,
            tracker: OwnershipTracker::new(),
            default_timeout: DEFAULT_TIMEOUT,
            default_ttl: Some(DEFAULT_TTL),
            backoff: None,
        }
    }

    /// Build the backend and defaults described by `config`.
    pub fn from_config(config: &LockConfig) -> Result<Self> {
        let backend = backends::from_config(config)?;
        info!(
            backend = backend.name(),
            location = %backend.location(),
            "lock manager ready"
        );

        let mut manager =
            Self::new(backend).with_defaults(config.default_timeout(), config.default_ttl());
        if let Some(backoff) = &config.backoff {
            manager = manager.with_backoff(backoff.min(), backoff.max());
        }
        Ok(manager)
    }

    /// Replace the timeout and TTL used by [`acquire_default`](Self::acquire_default).
    pub fn with_defaults(mut self, timeout: Duration, ttl: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self.default_ttl = ttl;
        self
    }

    /// Override the backend's retry sleep window.
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff = Some((min, max.max(min)));
        self
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn backend(&self) -> &dyn LockBackend {
        self.backend.as_ref()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Keys this manager currently believes it holds.
    pub fn held_keys(&self) -> Vec<String> {
        self.tracker.snapshot()
    }

    /// Acquire `key`, retrying for up to `timeout`.
    ///
    /// A zero `timeout` makes a single attempt on polling backends and
    /// blocks until the key is free on the semaphore backend. `ttl` bounds
    /// how long the claim survives if it is never released (`None`: forever;
    /// ignored by the semaphore backend).
    ///
    /// Returns `Ok(false)` if the key stayed held by someone else. Errors
    /// only when the backend itself fails.
    pub fn acquire(&self, key: &str, timeout: Duration, ttl: Option<Duration>) -> Result<bool> {
        validate_key(key)?;

        if self.tracker.contains(key) {
            match self.backend.try_claim(key, self.owner, ttl)? {
                Claim::Acquired | Claim::AlreadyOwned => return Ok(true),
                Claim::Held { owner } => {
                    warn!(key, holder = ?owner, "held lock was lost, probably expired");
                    self.tracker.mark_released(key);
                }
            }
        }

        let acquired = match self.backend.retry_strategy() {
            RetryStrategy::Native => {
                let claim = if timeout.is_zero() {
                    self.backend.claim_blocking(key, self.owner, ttl)?
                } else {
                    self.backend.try_claim(key, self.owner, ttl)?
                };
                claim.is_held_by_caller()
            }
            RetryStrategy::Poll { min, max } => {
                let (min, max) = self.backoff.unwrap_or((min, max));
                self.poll(key, timeout, ttl, min, max)?
            }
        };

        if acquired {
            self.tracker.mark_acquired(key);
            debug!(key, owner = %self.owner, "lock acquired");
        } else {
            debug!(key, owner = %self.owner, ?timeout, "lock not acquired");
        }
        Ok(acquired)
    }

    /// Acquire `key` with the configured default timeout and TTL.
    pub fn acquire_default(&self, key: &str) -> Result<bool> {
        self.acquire(key, self.default_timeout, self.default_ttl)
    }

    fn poll(
        &self,
        key: &str,
        timeout: Duration,
        ttl: Option<Duration>,
        min: Duration,
        max: Duration,
    ) -> Result<bool> {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if self.backend.try_claim(key, self.owner, ttl)?.is_held_by_caller() {
                return Ok(true);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                debug!(key, attempts, "gave up waiting for lock");
                return Ok(false);
            }

            thread::sleep(jitter(min, max).min(timeout - elapsed));
        }
    }

    /// Acquire `key` and return a guard that releases it on drop.
    ///
    /// `Ok(None)` means the key stayed held by someone else.
    pub fn lock(
        &self,
        key: &str,
        timeout: Duration,
        ttl: Option<Duration>,
    ) -> Result<Option<LockGuard<'_>>> {
        if self.acquire(key, timeout, ttl)? {
            Ok(Some(LockGuard::new(self, key)))
        } else {
            Ok(None)
        }
    }

    /// Release `key`.
    ///
    /// With [`ReleaseMode::Owner`] nothing happens unless this manager's
    /// owner holds the key; with [`ReleaseMode::Override`] the record is
    /// cleared no matter who holds it. Returns whether a lock was released.
    pub fn release(&self, key: &str, mode: ReleaseMode) -> Result<bool> {
        validate_key(key)?;

        let released = self.backend.try_release(key, self.owner, mode)?;
        // Either it was released, or the backend says it is not ours.
        self.tracker.mark_released(key);

        debug!(key, owner = %self.owner, ?mode, released, "lock release");
        Ok(released)
    }

    /// Release every key this manager holds.
    ///
    /// With [`ReleaseMode::Override`], every key the backend can enumerate
    /// is force-released as well. Returns `true` only if every release
    /// succeeded.
    pub fn release_all(&self, mode: ReleaseMode) -> Result<bool> {
        let mut success = true;

        for key in self.tracker.snapshot() {
            if !self.release(&key, mode)? {
                warn!(key = %key, "failed to release held lock");
                success = false;
            }
        }

        if mode.is_override()
            && let Some(keys) = self.backend.enumerate("")?
        {
            for key in keys {
                if !self.release(&key, mode)? {
                    warn!(key = %key, "failed to force-release lock");
                    success = false;
                }
            }
        }

        Ok(success)
    }

    /// Whether `key` is held by anyone.
    pub fn is_locked(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.backend.peek(key)
    }

    /// Held keys starting with `prefix` (`""` for all).
    ///
    /// Backends that cannot enumerate their keys report only the keys this
    /// manager holds, so the result is not globally complete there.
    pub fn get_locks(&self, prefix: &str) -> Result<BTreeSet<String>> {
        match self.backend.enumerate(prefix)? {
            Some(keys) => Ok(keys),
            None => Ok(self.tracker.with_prefix(prefix)),
        }
    }

    /// Run `work` as one unit of work, then release everything this manager
    /// still holds, even locks `work` forgot to release.
    pub fn unit_of_work<T>(&self, work: impl FnOnce(&Self) -> T) -> Result<T> {
        let out = work(self);
        if !self.release_all(ReleaseMode::Owner)? {
            warn!(owner = %self.owner, "some locks could not be released after unit of work");
        }
        Ok(out)
    }
}

/// Uniform random sleep in `[min, max]`.
fn jitter(min: Duration, max: Duration) -> Duration {
    let lo = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
    let hi = u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(lo);
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}
