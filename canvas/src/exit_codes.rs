//! Stable exit codes for the `canvas` admin CLI.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid configuration, unreadable storage, or any other failure.
pub const INVALID: i32 = 1;
