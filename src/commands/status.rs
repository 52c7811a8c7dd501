//! Implementation of the `distlock status` command.

use crate::error::Result;
use crate::locks::LockManager;
use std::io::Write;

/// Print the backend in use, this process's owner identity, where the locks
/// live and how many are held.
pub fn cmd_status(manager: &LockManager, out: &mut impl Write) -> Result<()> {
    let backend = manager.backend();
    let held = manager.get_locks("")?;

    writeln!(out, "Lock Status")?;
    writeln!(out, "===========")?;
    writeln!(out, "Backend:  {}", backend.name())?;
    writeln!(out, "Location: {}", backend.location())?;
    writeln!(out, "Owner:    {}", manager.owner().describe())?;
    writeln!(out, "Held:     {}", held.len())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{manager, output};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn shows_backend_and_counts() {
        let temp_dir = TempDir::new().unwrap();
        let locks = manager(temp_dir.path(), 42);
        locks.acquire("a", Duration::ZERO, None).unwrap();

        let mut out = Vec::new();
        cmd_status(&locks, &mut out).unwrap();
        let text = output(out);

        assert!(text.contains("Backend:  database"));
        assert!(text.contains(&temp_dir.path().join("locks.json").display().to_string()));
        assert!(text.contains("Owner:    42@"));
        assert!(text.contains("Held:     1"));
    }
}
