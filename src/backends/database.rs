//! Persistent-store backend over the durable lock table.

use super::{LockBackend, RetryStrategy};
use crate::error::Result;
use crate::locks::{Claim, Owner, ReleaseMode};
use crate::store::{LockRecord, LockTable};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Locks stored as records in a shared table file.
///
/// A crashed holder leaves its record behind until `expires` passes, so
/// TTLs should cover the critical section and little more.
#[derive(Debug, Clone)]
pub struct DatabaseBackend {
    table: LockTable,
}

impl DatabaseBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            table: LockTable::new(path),
        }
    }

    /// The underlying table.
    pub fn table(&self) -> &LockTable {
        &self.table
    }

    /// Live records, sorted by name. Used by diagnostics.
    pub fn records(&self) -> Result<Vec<LockRecord>> {
        let now = Utc::now();
        self.table.read(|rows| {
            rows.iter()
                .filter(|r| r.is_held(now))
                .cloned()
                .collect()
        })
    }
}

impl LockBackend for DatabaseBackend {
    fn name(&self) -> &'static str {
        "database"
    }

    fn try_claim(&self, key: &str, owner: Owner, ttl: Option<Duration>) -> Result<Claim> {
        let claim = self.table.transact(|rows| {
            let now = Utc::now();
            let claim = match rows.get_live(key, now) {
                Some(record) if record.locked && record.owner != owner.id() => {
                    return Claim::Held {
                        owner: Some(record.owner),
                    };
                }
                Some(record) if record.locked => Claim::AlreadyOwned,
                // Free: no record, an expired one, or one marked unlocked.
                _ => Claim::Acquired,
            };

            rows.upsert(LockRecord::claimed(key, owner.id(), now, ttl));
            claim
        })?;

        debug!(key, owner = %owner, ?claim, "database claim");
        Ok(claim)
    }

    fn try_release(&self, key: &str, owner: Owner, mode: ReleaseMode) -> Result<bool> {
        let released = self.table.transact(|rows| {
            let matches = match rows.get(key) {
                Some(record) => mode.is_override() || record.owner == owner.id(),
                None => false,
            };
            matches && rows.remove(key).is_some()
        })?;

        debug!(key, owner = %owner, ?mode, released, "database release");
        Ok(released)
    }

    fn peek(&self, key: &str) -> Result<bool> {
        let now = Utc::now();
        self.table
            .read(|rows| rows.get(key).is_some_and(|r| r.is_held(now)))
    }

    fn enumerate(&self, prefix: &str) -> Result<Option<BTreeSet<String>>> {
        let now = Utc::now();
        let keys = self.table.read(|rows| {
            rows.iter()
                .filter(|r| r.name.starts_with(prefix) && r.is_held(now))
                .map(|r| r.name.clone())
                .collect()
        })?;
        Ok(Some(keys))
    }

    fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::Poll {
            min: Duration::from_millis(100),
            max: Duration::from_secs(2),
        }
    }

    fn location(&self) -> String {
        self.table.path().display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn backend() -> (TempDir, DatabaseBackend) {
        let dir = TempDir::new().unwrap();
        let backend = DatabaseBackend::new(dir.path().join("locks.json"));
        (dir, backend)
    }

    fn owner(id: u32) -> Owner {
        Owner::new(id).unwrap()
    }

    #[test]
    fn claim_free_key() {
        let (_dir, db) = backend();

        let claim = db.try_claim("k", owner(1), None).unwrap();

        assert_eq!(claim, Claim::Acquired);
        assert!(db.peek("k").unwrap());
    }

    #[test]
    fn claim_held_key_reports_holder() {
        let (_dir, db) = backend();
        db.try_claim("k", owner(1), None).unwrap();

        let claim = db.try_claim("k", owner(2), None).unwrap();

        assert_eq!(claim, Claim::Held { owner: Some(1) });
    }

    #[test]
    fn reclaim_restamps_expiry_without_duplicating() {
        let (_dir, db) = backend();
        db.try_claim("k", owner(1), Some(Duration::from_secs(10))).unwrap();
        let first = db.records().unwrap()[0].expires;

        std::thread::sleep(Duration::from_millis(20));
        let claim = db.try_claim("k", owner(1), Some(Duration::from_secs(10))).unwrap();

        assert_eq!(claim, Claim::AlreadyOwned);
        let records = db.records().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].expires > first);
    }

    #[test]
    fn expired_record_is_overwritten() {
        let (_dir, db) = backend();
        let past = Utc::now() - TimeDelta::seconds(30);
        db.table()
            .transact(|rows| {
                let mut record = LockRecord::claimed("k", 1, past, None);
                record.expires = Some(past);
                rows.upsert(record);
            })
            .unwrap();

        assert!(!db.peek("k").unwrap());
        assert_eq!(db.try_claim("k", owner(2), None).unwrap(), Claim::Acquired);
        assert_eq!(db.records().unwrap()[0].owner, 2);
    }

    #[test]
    fn unlocked_record_is_free() {
        let (_dir, db) = backend();
        db.table()
            .transact(|rows| {
                let mut record = LockRecord::claimed("k", 1, Utc::now(), None);
                record.locked = false;
                rows.upsert(record);
            })
            .unwrap();

        assert!(!db.peek("k").unwrap());
        assert_eq!(db.try_claim("k", owner(2), None).unwrap(), Claim::Acquired);
    }

    #[test]
    fn release_requires_ownership_unless_overridden() {
        let (_dir, db) = backend();
        db.try_claim("k", owner(1), None).unwrap();

        assert!(!db.try_release("k", owner(2), ReleaseMode::Owner).unwrap());
        assert!(db.peek("k").unwrap());

        assert!(db.try_release("k", owner(2), ReleaseMode::Override).unwrap());
        assert!(!db.peek("k").unwrap());
        assert!(!db.try_release("k", owner(1), ReleaseMode::Owner).unwrap());
    }

    #[test]
    fn enumerate_filters_by_prefix_and_expiry() {
        let (_dir, db) = backend();
        db.try_claim("feed:1", owner(1), None).unwrap();
        db.try_claim("feed:2", owner(2), None).unwrap();
        db.try_claim("poll", owner(1), None).unwrap();
        db.try_claim("feed:3", owner(1), Some(Duration::from_millis(1))).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let keys = db.enumerate("feed:").unwrap().unwrap();

        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec!["feed:1".to_string(), "feed:2".to_string()]
        );
    }
}
