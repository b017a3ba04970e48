//! Executor abstraction for one agent iteration.
//!
//! The [`Executor`] trait decouples the loop controller from the actual agent
//! backend (the `claude` CLI). Tests use scripted executors that feed
//! predetermined stream lines through the same [`StreamState`] without
//! spawning processes.

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::completion::CompletionScanner;
use crate::core::event::{Decoded, decode_line};
use crate::core::render::{RenderOptions, render_event};
use crate::io::process::{drain_lines, spawn_piped};
use crate::io::session_log::SessionLog;

/// Default agent binary.
pub const DEFAULT_AGENT_PROGRAM: &str = "claude";

/// Parameters for one iteration.
#[derive(Debug, Clone)]
pub struct IterationRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Prompt passed inline to the agent.
    pub prompt: String,
    pub render: RenderOptions,
}

/// Result of an iteration whose agent exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationOutcome {
    /// All assistant text blocks of the iteration, concatenated in order.
    pub output: String,
    /// Whether the completion marker appeared in `output`.
    pub complete: bool,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Error)]
pub enum IterationError {
    /// The agent binary could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The agent ran but exited unsuccessfully.
    #[error("agent exited with {}", describe_exit(.code))]
    Failed { code: Option<i32> },
    /// Reading the agent's output failed.
    #[error("agent output stream failed: {0:#}")]
    Stream(anyhow::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Abstraction over agent execution backends.
pub trait Executor {
    /// Run one iteration, streaming its output through `log`.
    fn run_iteration(
        &self,
        request: &IterationRequest,
        log: &SessionLog,
    ) -> Result<IterationOutcome, IterationError>;
}

/// Fixed agent flags: edit permissions, inline prompt, verbose stream-json output.
pub fn agent_args(prompt: &str) -> Vec<&str> {
    vec![
        "--permission-mode",
        "acceptEdits",
        "-p",
        prompt,
        "--verbose",
        "--output-format",
        "stream-json",
    ]
}

/// Executor that spawns the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeExecutor {
    program: String,
}

impl ClaudeExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ClaudeExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_PROGRAM)
    }
}

impl Executor for ClaudeExecutor {
    #[instrument(skip_all, fields(program = %self.program, workdir = %request.workdir.display()))]
    fn run_iteration(
        &self,
        request: &IterationRequest,
        log: &SessionLog,
    ) -> Result<IterationOutcome, IterationError> {
        info!("starting agent iteration");
        let mut cmd = Command::new(&self.program);
        cmd.args(agent_args(&request.prompt))
            .current_dir(&request.workdir);
        let child = spawn_piped(cmd).map_err(|source| IterationError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut state = StreamState::new(log.clone(), request.render);
        let status = drain_lines(
            child,
            |line| state.handle_stdout(line),
            |line| log.stderr_line(line),
        )
        .map_err(IterationError::Stream)?;

        if !status.success() {
            warn!(exit_code = ?status.code(), "agent iteration failed");
            return Err(IterationError::Failed {
                code: status.code(),
            });
        }
        let outcome = state.finish(status.code());
        debug!(complete = outcome.complete, "agent iteration finished");
        Ok(outcome)
    }
}

/// Per-iteration stdout handling: journal, render, accumulate, scan.
#[derive(Debug)]
pub struct StreamState {
    log: SessionLog,
    render: RenderOptions,
    scanner: CompletionScanner,
}

impl StreamState {
    pub fn new(log: SessionLog, render: RenderOptions) -> Self {
        Self {
            log,
            render,
            scanner: CompletionScanner::new(),
        }
    }

    /// Process one stdout line. Blank lines are skipped; protocol lines are
    /// journaled verbatim before rendering; anything else is logged as-is.
    pub fn handle_stdout(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match decode_line(line) {
            Decoded::Event(event) => {
                self.log.raw(line);
                if let Some(rendered) = render_event(&event, &self.render) {
                    self.log.line(&rendered);
                }
                for text in event.assistant_text() {
                    let was_complete = self.scanner.is_complete();
                    if self.scanner.push(text) && !was_complete {
                        debug!("completion marker observed");
                    }
                }
            }
            Decoded::Opaque(raw) => self.log.line(&raw),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.scanner.is_complete()
    }

    pub fn finish(self, exit_code: Option<i32>) -> IterationOutcome {
        let complete = self.scanner.is_complete();
        IterationOutcome {
            output: self.scanner.into_text(),
            complete,
            exit_code,
        }
    }
}
