//! I/O helpers for loop commands: processes, logs, config, specs, git.

pub mod config;
pub mod executor;
pub mod git;
pub mod process;
pub mod prompt;
pub mod session_log;
pub mod specs;
pub mod worktree;
