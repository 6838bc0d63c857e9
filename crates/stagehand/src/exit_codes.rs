//! Exit codes for the CLI

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error (invalid file, unknown task, task cycle)
pub const CONFIG_ERROR: i32 = 2;

/// The browser test suite reported failures
pub const TEST_FAILURE: i32 = 3;

/// User cancelled
pub const CANCELLED: i32 = 130;
