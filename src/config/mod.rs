//! Configuration model for the lock subsystem.
//!
//! [`LockConfig`] is read from a YAML file. Parsing is forward-compatible
//! (unknown fields are ignored), every field has a default, and values are
//! validated on load.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::LockConfig;
pub use types::{
    BackendKind, BackoffConfig, CacheConfig, CacheDriver, DatabaseConfig, SemaphoreConfig,
};
