//! Stable exit codes for `ralph` commands.

/// Command succeeded; for loops, the agent reported the spec complete.
pub const OK: i32 = 0;
/// Invalid input/config, missing spec files, or an agent iteration failed.
pub const ERROR: i32 = 1;
/// The iteration budget ran out before the agent reported completion.
pub const MAX_ITERATIONS: i32 = 2;
