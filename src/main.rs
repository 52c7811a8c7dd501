//! distlock: inspect and manage named cross-process locks.
//!
//! This is the main entry point for the `distlock` CLI. It parses arguments,
//! dispatches to the appropriate command handler, and handles errors with
//! proper exit codes.

use distlock::cli::Cli;
use distlock::{commands, exit_codes, logging};
use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init(cli.verbose);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = commands::dispatch(cli, &mut out);
    let _ = out.flush();

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            ExitCode::from(err.exit_code() as u8)
        }
    }
}
