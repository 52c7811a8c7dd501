//! Implementation of the `distlock clear` command.

use crate::error::{LockError, Result};
use crate::locks::{LockManager, ReleaseMode};
use std::io::Write;

/// Force-release every lock the backend knows about.
pub fn cmd_clear(manager: &LockManager, out: &mut impl Write) -> Result<()> {
    if !manager.release_all(ReleaseMode::Override)? {
        return Err(LockError::LockFailed(
            "Unable to clear the locks.".to_string(),
        ));
    }

    writeln!(out, "Locks successfully cleared.")?;
    Ok(())
}
