//! Durable lock table used by the database backend.
//!
//! The table is a JSON document holding one [`LockRecord`] per lock name:
//!
//! ```json
//! { "records": { "feed-rebuild:42": { "name": "feed-rebuild:42", "owner": 4242,
//!   "locked": true, "expires": "2026-10-19T12:00:00Z" } } }
//! ```
//!
//! # Table Lock
//!
//! Every read-check-write sequence runs while holding an exclusive advisory
//! lock on a sidecar `<table>.lock` file. This is the table-level lock: the
//! only atomicity primitive of the backend, so nothing but table I/O happens
//! while it is held. Readers take the same lock in shared mode.
//!
//! The table itself is replaced with an atomic rename, which is why the lock
//! lives on a separate file: a lock on the table inode would be lost on every
//! write.

mod record;
mod table;

pub use record::LockRecord;
pub use table::{LockTable, TableRows};
