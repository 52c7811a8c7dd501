//! distlock: named, cross-process mutual exclusion.
//!
//! Callers identify a critical section by a string key and ask a
//! [`LockManager`](locks::LockManager) to acquire it with a timeout and a
//! TTL. The manager works on top of one of three interchangeable backends:
//!
//! - a durable lock table file shared by every process on the host
//!   ([`backends::DatabaseBackend`])
//! - a shared key/value cache such as redis ([`backends::CacheBackend`])
//! - System V semaphores ([`backends::SemaphoreBackend`], Unix only)
//!
//! ```no_run
//! use distlock::config::LockConfig;
//! use distlock::locks::LockManager;
//! use std::time::Duration;
//!
//! # fn main() -> distlock::error::Result<()> {
//! let locks = LockManager::from_config(&LockConfig::default())?;
//! if let Some(_guard) = locks.lock("feed-rebuild:42", Duration::from_secs(10), None)? {
//!     // exclusive work
//! }
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod logging;
pub mod store;
