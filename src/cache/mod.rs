//! Key/value caches usable by the cache lock backend.
//!
//! A cache qualifies when it offers an atomic compare-and-set and a TTL-aware
//! set. Values are strings; the lock backend stores owner ids in them.

mod memory;
mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

use crate::error::Result;
use std::fmt::Debug;
use std::time::Duration;

/// Minimal cache capability needed for locking.
///
/// Every `ttl` is `None` for "no expiry".
pub trait SharedCache: Send + Sync + Debug {
    /// Short driver name for diagnostics.
    fn name(&self) -> &'static str;

    /// Current value at `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set `key` to `value` only if it is absent. Returns whether it was set.
    fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Atomically replace `key` with `new` if it currently equals `expected`.
    fn compare_set(&self, key: &str, expected: &str, new: &str, ttl: Option<Duration>)
        -> Result<bool>;

    /// Atomically delete `key` if it currently equals `expected`.
    fn compare_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Delete `key` unconditionally. Returns whether anything was deleted.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All live keys starting with `prefix`, or `None` if this cache cannot
    /// scan its key space.
    fn keys(&self, prefix: &str) -> Result<Option<Vec<String>>>;
}
