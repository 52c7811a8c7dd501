//! Named cross-process locks.
//!
//! [`LockManager`] is the public entry point. It delegates atomic claims to a
//! [`LockBackend`](crate::backends::LockBackend) and keeps a per-instance
//! [`OwnershipTracker`] of the keys it holds.
//!
//! # Acquire
//!
//! Polling backends (database, cache) are retried with a jittered sleep
//! until the timeout runs out; the semaphore backend blocks natively instead.
//! Contention is never an error: `acquire` returns `Ok(false)`.
//!
//! # Release
//!
//! Normal releases only succeed for the current owner. Override releases
//! force-clear a lock regardless of owner and are meant for administrative
//! cleanup only.
//!
//! # RAII Guards
//!
//! [`LockManager::lock`] returns a guard that releases the lock when dropped.
//! If the release fails during drop, a warning is logged but the program does
//! not crash.

mod guard;
mod manager;
mod tracker;
mod types;


// Re-export public API
pub use guard::LockGuard;
pub use manager::{DEFAULT_TIMEOUT, DEFAULT_TTL, LockManager};
pub use tracker::OwnershipTracker;
pub use types::{Claim, Owner, ReleaseMode, validate_key};
