//! Stable exit codes for pathway CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, sidecar or input file, or any other error.
pub const INVALID: i32 = 1;
/// `pathway filter` kept no streamline.
pub const EMPTY: i32 = 2;
