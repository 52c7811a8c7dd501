//! Command implementations for distlock.
//!
//! [`dispatch`] loads the configuration, builds one [`LockManager`] for this
//! process and routes the parsed command to its handler. Handlers write to
//! any [`Write`] sink and report failures as errors, so `main` owns stdout,
//! stderr and the exit code.

mod clear;
mod del;
mod list;
mod set;
mod status;

pub use clear::cmd_clear;
pub use del::cmd_del;
pub use list::cmd_list;
pub use set::cmd_set;
pub use status::cmd_status;

use crate::cli::{Cli, Command};
use crate::config::{BackendKind, LockConfig};
use crate::error::Result;
use crate::locks::LockManager;
use std::io::Write;
use std::path::Path;

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.backend)?;
    let manager = LockManager::from_config(&config)?;
    run(&manager, cli.command, out)
}

/// Run `command` against an existing manager.
pub fn run(manager: &LockManager, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::List(args) => cmd_list(manager, args.prefix.as_deref(), out),
        Command::Set(args) => cmd_set(manager, &args, out),
        Command::Del(args) => cmd_del(manager, &args.lock, out),
        Command::Clear => cmd_clear(manager, out),
        Command::Status => cmd_status(manager, out),
    }
}

/// Read `path` if given, else use defaults, then apply the `--backend` override.
pub fn load_config(path: Option<&Path>, backend: Option<BackendKind>) -> Result<LockConfig> {
    let mut config = match path {
        Some(path) => LockConfig::load(path)?,
        None => LockConfig::default(),
    };
    if let Some(backend) = backend {
        config.backend = backend;
    }
    Ok(config)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::backends::DatabaseBackend;
    use crate::locks::{LockManager, Owner};
    use std::path::Path;
    use std::time::Duration;

    /// A manager on the lock table in `dir`, acting as `owner`.
    pub(crate) fn manager(dir: &Path, owner: u32) -> LockManager {
        LockManager::with_owner(
            Box::new(DatabaseBackend::new(dir.join("locks.json"))),
            Owner::new(owner).unwrap(),
        )
        .with_defaults(Duration::ZERO, Some(Duration::from_secs(300)))
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    pub(crate) fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ListArgs;
    use tempfile::TempDir;

    #[test]
    fn load_config_defaults_without_file() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config, LockConfig::default());
    }

    #[test]
    fn load_config_backend_flag_wins() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("distlock.yaml");
        std::fs::write(&path, "backend: cache\n").unwrap();

        let config = load_config(Some(&path), Some(BackendKind::Database)).unwrap();

        assert_eq!(config.backend, BackendKind::Database);
    }

    #[test]
    fn dispatch_uses_configured_table() {
        let temp_dir = TempDir::new().unwrap();
        let table = temp_dir.path().join("locks.json");
        let path = temp_dir.path().join("distlock.yaml");
        std::fs::write(
            &path,
            format!("backend: database\ndatabase:\n  path: {}\n", table.display()),
        )
        .unwrap();

        let cli = Cli {
            config: Some(path),
            backend: None,
            verbose: 0,
            command: Command::List(ListArgs { prefix: None }),
        };
        let mut out = Vec::new();
        dispatch(cli, &mut out).unwrap();

        assert_eq!(
            test_support::output(out),
            "Listing all Locks:\n0 locks found\n"
        );
    }
}
