//! Per-instance bookkeeping of held keys.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

/// Keys this lock manager believes it holds.
///
/// Never persisted: it lives as long as the owning manager and is the source
/// of truth for "release everything I hold".
#[derive(Debug, Default)]
pub struct OwnershipTracker {
    keys: Mutex<BTreeSet<String>>,
}

impl OwnershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> MutexGuard<'_, BTreeSet<String>> {
        // A panic while holding the guard cannot leave the set inconsistent.
        self.keys.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Record that `key` is held. Returns `false` if it already was.
    pub fn mark_acquired(&self, key: &str) -> bool {
        self.keys().insert(key.to_string())
    }

    /// Forget `key`. Returns `false` if it was not tracked.
    pub fn mark_released(&self, key: &str) -> bool {
        self.keys().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().contains(key)
    }

    /// Snapshot of all tracked keys, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        self.keys().iter().cloned().collect()
    }

    /// Tracked keys starting with `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> BTreeSet<String> {
        self.keys()
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_acquire_and_release() {
        let tracker = OwnershipTracker::new();

        assert!(tracker.mark_acquired("a"));
        assert!(!tracker.mark_acquired("a"));
        assert!(tracker.contains("a"));
        assert_eq!(tracker.len(), 1);

        assert!(tracker.mark_released("a"));
        assert!(!tracker.mark_released("a"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn filters_by_prefix() {
        let tracker = OwnershipTracker::new();
        tracker.mark_acquired("feed-rebuild:1");
        tracker.mark_acquired("feed-rebuild:2");
        tracker.mark_acquired("poller");

        let feed = tracker.with_prefix("feed-");
        assert_eq!(feed.len(), 2);
        assert!(!feed.contains("poller"));
        assert_eq!(tracker.with_prefix("").len(), 3);
        assert_eq!(tracker.snapshot(), vec!["feed-rebuild:1", "feed-rebuild:2", "poller"]);
    }
}
