//! A single row of the lock table.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A claimed lock name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// The lock key. Unique within the table.
    pub name: String,

    /// Id of the holding process.
    pub owner: u32,

    /// Whether the record is currently claimed.
    pub locked: bool,

    /// Absolute expiry. `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl LockRecord {
    /// A fresh claim on `name` by `owner`, valid for `ttl` from `now`.
    pub fn claimed(name: &str, owner: u32, now: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            owner,
            locked: true,
            expires: expiry_from(now, ttl),
        }
    }

    /// Whether the record still counts at `now`. Expired records are free no
    /// matter what `locked` and `owner` say.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_none_or(|expires| expires >= now)
    }

    /// Whether the record blocks other owners at `now`.
    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        self.locked && self.is_live(now)
    }
}

/// Absolute expiry for a TTL. TTLs too large to represent never expire.
pub fn expiry_from(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = TimeDelta::from_std(ttl?).ok()?;
    now.checked_add_signed(ttl)
}
