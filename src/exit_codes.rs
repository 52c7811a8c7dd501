//! Exit code constants for the distlock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config, invalid key)
//! - 2: Lock not acquired or not released (contention / ownership)
//! - 3: Backend unavailable or unsupported on this platform

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, unreadable or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// The lock could not be acquired, released, or cleared.
pub const LOCK_FAILURE: i32 = 2;

/// The configured backend could not be reached or is unsupported here.
pub const BACKEND_FAILURE: i32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, LOCK_FAILURE, BACKEND_FAILURE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
