//! Config loading, validation, and derived values.

use super::model::LockConfig;
use super::types::{BackendKind, CacheDriver, default_state_dir};
use crate::error::{LockError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

impl LockConfig {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: LockConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - `backoff.max_ms` must be positive and at least `backoff.min_ms`
    /// - the redis driver needs `cache.url`
    /// - `cache.prefix` must be non-empty
    pub fn validate(&self) -> Result<()> {
        if let Some(backoff) = &self.backoff {
            if backoff.max_ms == 0 {
                return Err(LockError::Config(
                    "config validation failed: backoff.max_ms must be greater than 0".to_string(),
                ));
            }
            if backoff.max_ms < backoff.min_ms {
                return Err(LockError::Config(format!(
                    "config validation failed: backoff.max_ms ({}) is less than backoff.min_ms ({})",
                    backoff.max_ms, backoff.min_ms
                )));
            }
        }

        if self.cache.driver == CacheDriver::Redis
            && self.cache.url.as_deref().is_none_or(str::is_empty)
        {
            return Err(LockError::Config(
                "config validation failed: cache.url is required for the redis driver".to_string(),
            ));
        }

        if self.cache.prefix.is_empty() {
            return Err(LockError::Config(
                "config validation failed: cache.prefix must be non-empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The backend to build, with `auto` resolved.
    ///
    /// Auto picks the cache when a shared cache server is configured, the
    /// semaphore backend on Unix, and the lock table otherwise.
    pub fn resolved_backend(&self) -> BackendKind {
        match self.backend {
            BackendKind::Auto if self.cache.driver == CacheDriver::Redis => BackendKind::Cache,
            BackendKind::Auto if cfg!(unix) => BackendKind::Semaphore,
            BackendKind::Auto => BackendKind::Database,
            kind => kind,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// `None` when claims should never expire.
    pub fn default_ttl(&self) -> Option<Duration> {
        match self.default_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| default_state_dir().join("locks.json"))
    }

    pub fn semaphore_dir(&self) -> PathBuf {
        self.semaphore
            .key_dir
            .clone()
            .unwrap_or_else(|| default_state_dir().join("sem"))
    }
}
