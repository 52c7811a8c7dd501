//! In-process cache.
//!
//! Shares its map between clones, so several lock managers in one process
//! (or test threads simulating separate processes) contend on the same keys.
//! It gives no cross-process exclusion.

use super::SharedCache;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires.is_none_or(|expires| expires > now)
    }
}

/// TTL-aware in-memory cache with atomic compare operations.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Value at `key` if live, dropping it when expired.
    fn live_value(map: &mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<String> {
        match map.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }
}

fn deadline(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|ttl| now.checked_add(ttl))
}

impl SharedCache for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut map = self.entries();
        Ok(Self::live_value(&mut map, key, Instant::now()))
    }

    fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let mut map = self.entries();
        if Self::live_value(&mut map, key, now).is_some() {
            return Ok(false);
        }

        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires: deadline(now, ttl),
            },
        );
        Ok(true)
    }

    fn compare_set(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut map = self.entries();
        if Self::live_value(&mut map, key, now).as_deref() != Some(expected) {
            return Ok(false);
        }

        map.insert(
            key.to_string(),
            Entry {
                value: new.to_string(),
                expires: deadline(now, ttl),
            },
        );
        Ok(true)
    }

    fn compare_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut map = self.entries();
        if Self::live_value(&mut map, key, Instant::now()).as_deref() != Some(expected) {
            return Ok(false);
        }

        map.remove(key);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut map = self.entries();
        let live = Self::live_value(&mut map, key, Instant::now()).is_some();
        map.remove(key);
        Ok(live)
    }

    fn keys(&self, prefix: &str) -> Result<Option<Vec<String>>> {
        let now = Instant::now();
        let map = self.entries();
        let mut keys: Vec<String> = map
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(Some(keys))
    }
}
