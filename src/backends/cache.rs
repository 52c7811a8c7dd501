//! Shared-cache backend built on compare-and-set.
//!
//! # Claim Protocol
//!
//! For `lock:<name>`:
//! 1. Stored value equals our owner id: refresh the TTL, reentrant success.
//! 2. Absent: `add` the sentinel `"0"`, then compare-and-set `"0"` to our
//!    owner id.
//! 3. Stored value is the sentinel: compare-and-set it straight to our id.
//! 4. Any other value: held by someone else.
//!
//! A sentinel is never a holder. Exclusion rests on the compare-and-set from
//! `"0"` alone, of which only one can succeed; the `add` step only narrows
//! the window. A claimer that dies between the two steps therefore leaves a
//! sentinel the next claimer takes over, even when it carries no TTL.

use super::{LockBackend, RetryStrategy};
use crate::cache::SharedCache;
use crate::error::Result;
use crate::locks::{Claim, Owner, ReleaseMode};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default namespace for lock keys inside a shared cache.
pub const DEFAULT_CACHE_PREFIX: &str = "lock:";

/// Value of a key that is being claimed but not yet owned.
const SENTINEL: &str = "0";

/// Locks stored as owner ids in a shared cache.
#[derive(Debug, Clone)]
pub struct CacheBackend {
    cache: Arc<dyn SharedCache>,
    prefix: String,
}

impl CacheBackend {
    /// Use `cache` with the default `lock:` namespace.
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self::with_prefix(cache, DEFAULT_CACHE_PREFIX)
    }

    /// Use `cache` with a custom key namespace.
    pub fn with_prefix(cache: Arc<dyn SharedCache>, prefix: &str) -> Self {
        Self {
            cache,
            prefix: prefix.to_string(),
        }
    }

    fn cache_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Whether `cache_key` holds an owner id rather than nothing or a sentinel.
    fn is_owned(&self, cache_key: &str) -> Result<bool> {
        Ok(self
            .cache
            .get(cache_key)?
            .is_some_and(|value| value != SENTINEL))
    }
}

impl LockBackend for CacheBackend {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn try_claim(&self, key: &str, owner: Owner, ttl: Option<Duration>) -> Result<Claim> {
        let cache_key = self.cache_key(key);
        let me = owner.to_string();

        let claim = match self.cache.get(&cache_key)? {
            Some(current) if current == me => {
                // Refresh the TTL. Failure means our claim expired just now.
                if self.cache.compare_set(&cache_key, &me, &me, ttl)? {
                    Claim::AlreadyOwned
                } else {
                    Claim::Held { owner: None }
                }
            }
            Some(current) if current != SENTINEL => Claim::Held {
                owner: current.parse().ok(),
            },
            pending => {
                if pending.is_none() {
                    self.cache.add(&cache_key, SENTINEL, ttl)?;
                }
                if self.cache.compare_set(&cache_key, SENTINEL, &me, ttl)? {
                    Claim::Acquired
                } else {
                    Claim::Held { owner: None }
                }
            }
        };

        debug!(key, owner = %owner, ?claim, cache = self.cache.name(), "cache claim");
        Ok(claim)
    }

    fn try_release(&self, key: &str, owner: Owner, mode: ReleaseMode) -> Result<bool> {
        let cache_key = self.cache_key(key);
        let released = match mode {
            ReleaseMode::Override => self.cache.delete(&cache_key)?,
            ReleaseMode::Owner => self.cache.compare_delete(&cache_key, &owner.to_string())?,
        };

        debug!(key, owner = %owner, ?mode, released, "cache release");
        Ok(released)
    }

    fn peek(&self, key: &str) -> Result<bool> {
        self.is_owned(&self.cache_key(key))
    }

    fn enumerate(&self, prefix: &str) -> Result<Option<BTreeSet<String>>> {
        let Some(cache_keys) = self.cache.keys(&self.cache_key(prefix))? else {
            return Ok(None);
        };

        let mut keys = BTreeSet::new();
        for cache_key in cache_keys {
            let Some(key) = cache_key.strip_prefix(&self.prefix) else {
                continue;
            };
            if self.is_owned(&cache_key)? {
                keys.insert(key.to_string());
            }
        }
        Ok(Some(keys))
    }

    fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::Poll {
            min: Duration::from_millis(10),
            max: Duration::from_millis(200),
        }
    }

    fn location(&self) -> String {
        format!("{} cache, keys '{}*'", self.cache.name(), self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::thread;

    fn owner(id: u32) -> Owner {
        Owner::new(id).unwrap()
    }

    fn backend() -> (MemoryCache, CacheBackend) {
        let cache = MemoryCache::new();
        let backend = CacheBackend::new(Arc::new(cache.clone()));
        (cache, backend)
    }

    /// A cache that cannot scan its keys.
    #[derive(Debug)]
    struct NoScan(MemoryCache);

    impl SharedCache for NoScan {
        fn name(&self) -> &'static str {
            "noscan"
        }
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }
        fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
            self.0.add(key, value, ttl)
        }
        fn compare_set(
            &self,
            key: &str,
            expected: &str,
            new: &str,
            ttl: Option<Duration>,
        ) -> Result<bool> {
            self.0.compare_set(key, expected, new, ttl)
        }
        fn compare_delete(&self, key: &str, expected: &str) -> Result<bool> {
            self.0.compare_delete(key, expected)
        }
        fn delete(&self, key: &str) -> Result<bool> {
            self.0.delete(key)
        }
        fn keys(&self, _prefix: &str) -> Result<Option<Vec<String>>> {
            Ok(None)
        }
    }

    #[test]
    fn claim_stores_owner_under_namespace() {
        let (cache, db) = backend();

        assert_eq!(db.try_claim("k", owner(42), None).unwrap(), Claim::Acquired);

        assert_eq!(cache.get("lock:k").unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn reclaim_by_same_owner_is_reentrant() {
        let (_cache, db) = backend();
        db.try_claim("k", owner(42), None).unwrap();

        assert_eq!(db.try_claim("k", owner(42), None).unwrap(), Claim::AlreadyOwned);
        assert_eq!(
            db.try_claim("k", owner(7), None).unwrap(),
            Claim::Held { owner: Some(42) }
        );
    }

    #[test]
    fn orphaned_sentinel_does_not_block() {
        let (cache, db) = backend();
        // A claimer died between `add` and the compare-and-set, with no TTL.
        cache.add("lock:k", SENTINEL, None).unwrap();

        assert!(!db.peek("k").unwrap());
        assert!(db.enumerate("").unwrap().unwrap().is_empty());

        assert_eq!(db.try_claim("k", owner(7), None).unwrap(), Claim::Acquired);
        assert_eq!(cache.get("lock:k").unwrap().as_deref(), Some("7"));
        assert_eq!(
            db.try_claim("k", owner(8), None).unwrap(),
            Claim::Held { owner: Some(7) }
        );
    }

    #[test]
    fn orphaned_sentinel_goes_to_a_single_claimer() {
        let (cache, db) = backend();
        cache.add("lock:k", SENTINEL, None).unwrap();
        let db = Arc::new(db);

        let claimers: Vec<_> = (1..=8)
            .map(|id| {
                let db = Arc::clone(&db);
                thread::spawn(move || db.try_claim("k", owner(id), None).unwrap())
            })
            .collect();
        let acquired = claimers
            .into_iter()
            .map(|c| c.join().unwrap())
            .filter(|claim| *claim == Claim::Acquired)
            .count();

        assert_eq!(acquired, 1);
    }

    #[test]
    fn override_clears_orphaned_sentinel() {
        let (cache, db) = backend();
        cache.add("lock:k", SENTINEL, None).unwrap();

        assert!(!db.try_release("k", owner(1), ReleaseMode::Owner).unwrap());
        assert!(db.try_release("k", owner(1), ReleaseMode::Override).unwrap());
        assert_eq!(cache.get("lock:k").unwrap(), None);
    }

    #[test]
    fn abandoned_claim_expires() {
        let (_cache, db) = backend();
        db.try_claim("k", owner(1), Some(Duration::from_millis(30))).unwrap();

        thread::sleep(Duration::from_millis(60));

        assert!(!db.peek("k").unwrap());
        assert_eq!(db.try_claim("k", owner(2), None).unwrap(), Claim::Acquired);
    }

    #[test]
    fn release_uses_compare_delete_unless_overridden() {
        let (_cache, db) = backend();
        db.try_claim("k", owner(1), None).unwrap();

        assert!(!db.try_release("k", owner(2), ReleaseMode::Owner).unwrap());
        assert!(db.peek("k").unwrap());
        assert!(db.try_release("k", owner(2), ReleaseMode::Override).unwrap());
        assert!(!db.peek("k").unwrap());
    }

    #[test]
    fn enumerate_strips_namespace() {
        let (cache, db) = backend();
        cache.add("unrelated", "1", None).unwrap();
        db.try_claim("feed:1", owner(1), None).unwrap();
        db.try_claim("poll", owner(1), None).unwrap();

        let keys = db.enumerate("feed:").unwrap().unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["feed:1".to_string()]);
        assert_eq!(db.enumerate("").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn enumerate_without_key_scan_is_none() {
        let db = CacheBackend::new(Arc::new(NoScan(MemoryCache::new())));
        db.try_claim("k", owner(1), None).unwrap();

        assert_eq!(db.enumerate("").unwrap(), None);
    }
}
