//! Stable exit codes for `tagbackup` commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Backup or restore failed: remote call, file I/O or a malformed record file.
pub const FAILED: i32 = 1;
/// Missing or invalid configuration; no file or remote I/O was attempted.
pub const INVALID_CONFIG: i32 = 2;
