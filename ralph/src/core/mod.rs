//! Deterministic, pure logic shared by the loop runner.
//!
//! Core modules are free of I/O side effects: they decode, render, and scan
//! in-memory text and return deterministic outputs suitable for tests.

pub mod ansi;
pub mod completion;
pub mod event;
pub mod render;
