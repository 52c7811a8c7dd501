//! Configuration sections and defaults for the lock subsystem.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which lock backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Pick the best backend available (default).
    #[default]
    Auto,
    /// Durable lock table on disk.
    Database,
    /// Shared key/value cache.
    Cache,
    /// System V semaphores (Unix only).
    Semaphore,
}

impl BackendKind {
    /// Parse a backend kind from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "database" => Some(Self::Database),
            "cache" => Some(Self::Cache),
            "semaphore" => Some(Self::Semaphore),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Database => "database",
            Self::Cache => "cache",
            Self::Semaphore => "semaphore",
        }
    }
}

/// Cache driver behind the cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheDriver {
    /// In-process map. Only useful for tests and single-process setups.
    #[default]
    Memory,
    /// Redis server at `cache.url`.
    Redis,
}

/// `database:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Lock table file (default: `<tmp>/distlock/locks.json`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// `cache:` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub driver: CacheDriver,

    /// Connection URL, e.g. `redis://127.0.0.1/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Namespace prepended to every lock key.
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            url: None,
            prefix: default_cache_prefix(),
        }
    }
}

/// `semaphore:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemaphoreConfig {
    /// Directory of per-key files (default: `<tmp>/distlock/sem`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_dir: Option<PathBuf>,
}

/// Sleep window between polling attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl BackoffConfig {
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

pub fn default_timeout_secs() -> u64 {
    120
}

pub fn default_ttl_secs() -> u64 {
    300
}

pub fn default_cache_prefix() -> String {
    crate::backends::DEFAULT_CACHE_PREFIX.to_string()
}

/// Base directory for on-disk defaults.
pub fn default_state_dir() -> PathBuf {
    std::env::temp_dir().join("distlock")
}
