//! Log setup for the distlock binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary. `RUST_LOG` wins when set, otherwise `-v` picks the level.

use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count: warn, then debug, then trace.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "distlock=debug",
        _ => "distlock=trace",
    }
}

/// Install the global subscriber, writing to stderr so command output on
/// stdout stays clean. Calling it twice is a no-op.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
