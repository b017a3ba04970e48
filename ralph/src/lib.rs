//! Agent loop runner for spec-driven development.
//!
//! Drives the `claude` CLI through repeated iterations against a spec until the
//! agent emits a completion marker or the iteration budget is exhausted. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (event decoding, rendering,
//!   completion detection). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (subprocesses, session logs, config,
//!   spec folders, git worktrees). Isolated behind small seams such as
//!   [`io::executor::Executor`] to enable scripted tests.
//!
//! [`looping`] is the loop controller; [`build_loop`] and [`plan_loop`]
//! coordinate it with the collaborators to implement CLI commands.

pub mod build_loop;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod plan_loop;
pub mod spec;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
