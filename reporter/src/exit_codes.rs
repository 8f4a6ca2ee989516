//! Stable exit codes for reporter CLI commands.

/// Command succeeded; every requested report completed.
pub const OK: i32 = 0;
/// Invalid config, arguments, or input files.
pub const INVALID: i32 = 1;
/// A run failed (model error, retries or iterations exhausted, tool failure).
pub const FAILED: i32 = 2;
/// The report chain stopped at `defaults.max_reports`.
pub const LIMIT: i32 = 3;
