//! Implementation of the `distlock list` command.

use crate::error::Result;
use crate::locks::LockManager;
use std::io::Write;

/// List held locks, optionally only those starting with `prefix`.
///
/// Backends that cannot enumerate only report what this process holds.
pub fn cmd_list(manager: &LockManager, prefix: Option<&str>, out: &mut impl Write) -> Result<()> {
    let prefix = prefix.unwrap_or("");
    let locks = manager.get_locks(prefix)?;

    if prefix.is_empty() {
        writeln!(out, "Listing all Locks:")?;
    } else {
        writeln!(out, "Listing all Locks starting with \"{}\":", prefix)?;
    }
    for lock in &locks {
        writeln!(out, "{}", lock)?;
    }
    writeln!(out, "{} locks found", locks.len())?;

    Ok(())
}
