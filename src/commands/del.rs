//! Implementation of the `distlock del` command.

use crate::error::{LockError, Result};
use crate::locks::{LockManager, ReleaseMode};
use std::io::Write;

/// Force-release a lock regardless of who holds it.
pub fn cmd_del(manager: &LockManager, lock: &str, out: &mut impl Write) -> Result<()> {
    if !manager.release(lock, ReleaseMode::Override)? {
        return Err(LockError::LockFailed(format!(
            "Couldn't release Lock '{}'",
            lock
        )));
    }

    writeln!(out, "Lock '{}' released.", lock)?;
    Ok(())
}
