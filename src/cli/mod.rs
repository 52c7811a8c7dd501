//! CLI argument parsing for distlock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::config::BackendKind;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// distlock: inspect and manage named cross-process locks.
///
/// Locks live in one of three backends:
/// - database: a durable lock table file
/// - cache: a shared key/value cache (redis)
/// - semaphore: System V semaphores on this host
#[derive(Parser, Debug)]
#[command(name = "distlock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML config file (defaults apply when omitted).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the configured backend (auto, database, cache, semaphore).
    #[arg(long, global = true, value_parser = parse_backend)]
    pub backend: Option<BackendKind>,

    /// Show more debug information (repeat for trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for distlock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all locks, optionally filtered by a prefix.
    List(ListArgs),

    /// Set a lock manually.
    ///
    /// The lock is taken for this process and survives it until the TTL
    /// runs out (semaphore locks end with the process).
    Set(SetArgs),

    /// Delete a lock, whoever holds it.
    Del(DelArgs),

    /// Clear all locks.
    Clear,

    /// Show which backend is in use and where its locks live.
    Status,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list locks whose name starts with this prefix.
    pub prefix: Option<String>,
}

/// Arguments for the `set` command.
#[derive(Parser, Debug)]
pub struct SetArgs {
    /// Lock name.
    pub lock: String,

    /// Seconds to wait for the lock (default: configured timeout).
    pub timeout: Option<u64>,

    /// Seconds the lock lives (default: configured TTL, 0 = forever).
    pub ttl: Option<u64>,
}

/// Arguments for the `del` command.
#[derive(Parser, Debug)]
pub struct DelArgs {
    /// Lock name.
    pub lock: String,
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    BackendKind::from_str(s).ok_or_else(|| {
        format!(
            "invalid backend '{}' (expected auto, database, cache or semaphore)",
            s
        )
    })
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
