//! LockConfig struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for the lock subsystem.
///
/// Read once when a [`LockManager`](crate::locks::LockManager) is built.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Backend selection (default: auto).
    pub backend: BackendKind,

    /// Seconds `acquire_default` keeps retrying a contended key.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Seconds an unreleased claim lives. 0 means it never expires.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub semaphore: SemaphoreConfig,

    /// Overrides the backend's own retry window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffConfig>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            default_timeout_secs: default_timeout_secs(),
            default_ttl_secs: default_ttl_secs(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            semaphore: SemaphoreConfig::default(),
            backoff: None,
        }
    }
}
