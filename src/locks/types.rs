//! Lock owner, claim outcome, and release mode definitions.

use crate::error::{LockError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a lock holder.
///
/// Normally the current process id. The cache backend stores it as a
/// decimal string; `0` is reserved as the cache claim sentinel, so owner ids
/// must be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(u32);

impl Owner {
    /// Create an owner from an explicit id.
    pub fn new(id: u32) -> Result<Self> {
        if id == 0 {
            return Err(LockError::InvalidOwner(id));
        }
        Ok(Self(id))
    }

    /// The owner identity of the current process.
    pub fn current() -> Self {
        // Process ids are never zero for user processes.
        Self(std::process::id().max(1))
    }

    /// The raw numeric id.
    pub fn id(self) -> u32 {
        self.0
    }

    /// Render the owner as `pid@host` for diagnostics.
    pub fn describe(self) -> String {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        format!("{}@{}", self.0, host)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single atomic claim attempt against a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The key was free (or expired) and is now held by the caller.
    Acquired,
    /// The caller already held the key; nothing new was created.
    AlreadyOwned,
    /// Someone else holds the key. The holder is reported when the backend
    /// knows it.
    Held { owner: Option<u32> },
}

impl Claim {
    /// Whether the caller holds the key after this attempt.
    pub fn is_held_by_caller(self) -> bool {
        matches!(self, Claim::Acquired | Claim::AlreadyOwned)
    }
}

/// How a release treats ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseMode {
    /// Release only if the caller is the current owner.
    #[default]
    Owner,
    /// Force-release regardless of owner. Administrative cleanup only.
    Override,
}

impl ReleaseMode {
    pub fn is_override(self) -> bool {
        self == ReleaseMode::Override
    }
}

/// Reject keys that cannot name a lock.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LockError::InvalidKey(key.to_string()));
    }
    Ok(())
}
