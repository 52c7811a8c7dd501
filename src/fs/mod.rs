//! Filesystem utilities for distlock.
//!
//! The lock table is rewritten on every claim and release, so writes go
//! through [`atomic_write`] and a crash can never leave a torn table behind.

pub mod atomic;

pub use atomic::atomic_write;
