//! Loop controller: run agent iterations until completion, failure, or budget.

use std::path::PathBuf;

use anyhow::{Result, bail};
use colored::Colorize;
use tracing::{info, instrument, warn};

use crate::core::render::RenderOptions;
use crate::exit_codes;
use crate::io::executor::{Executor, IterationRequest};
use crate::io::session_log::SessionLog;
use crate::spec::Spec;

/// Parameters for one loop invocation.
#[derive(Debug, Clone)]
pub struct LoopRequest {
    /// Prompt reused verbatim for every iteration.
    pub prompt: String,
    pub workdir: PathBuf,
    /// Iteration budget; must be at least 1.
    pub max_iterations: u32,
    /// Spec context. Session log files are only written when present.
    pub spec: Option<Spec>,
    pub render: RenderOptions,
}

/// Terminal state of a loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopResult {
    /// The agent emitted the completion marker within budget.
    FullyComplete,
    /// An iteration failed to launch or exited non-zero.
    Error,
    /// Every iteration ran without a completion marker.
    MaxIterationsReached,
}

impl LoopResult {
    pub fn exit_code(self) -> i32 {
        match self {
            LoopResult::FullyComplete => exit_codes::OK,
            LoopResult::Error => exit_codes::ERROR,
            LoopResult::MaxIterationsReached => exit_codes::MAX_ITERATIONS,
        }
    }
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub result: LoopResult,
    /// Iterations started, including a failed one.
    pub iterations_run: u32,
    /// Failure reason when `result` is `Error`.
    pub failure: Option<String>,
    pub transcript_path: Option<PathBuf>,
}

/// Run the agent up to `max_iterations` times with the same prompt.
///
/// Stops early on the first iteration that reports completion and on the first
/// failed iteration (no retry). The session log is closed on every path.
/// Returns `Err` only for precondition failures and for failing to open the
/// session log, both before any iteration runs.
#[instrument(skip_all, fields(max_iterations = request.max_iterations))]
pub fn run_loop<E: Executor>(executor: &E, request: &LoopRequest) -> Result<LoopOutcome> {
    if request.max_iterations == 0 {
        bail!("max iterations must be at least 1");
    }
    let log = match &request.spec {
        Some(spec) => SessionLog::open(&spec.folder, &spec.name)?,
        None => SessionLog::console(),
    };
    let transcript_path = log.transcript_path();

    let (result, iterations_run, failure) = drive(executor, request, &log);

    if let Err(err) = log.close() {
        warn!(err = %format!("{err:#}"), "failed to close session log");
    }
    info!(?result, iterations_run, "loop finished");
    Ok(LoopOutcome {
        result,
        iterations_run,
        failure,
        transcript_path,
    })
}

fn drive<E: Executor>(
    executor: &E,
    request: &LoopRequest,
    log: &SessionLog,
) -> (LoopResult, u32, Option<String>) {
    print_banner(request, log);

    let max = request.max_iterations;
    let iteration = IterationRequest {
        workdir: request.workdir.clone(),
        prompt: request.prompt.clone(),
        render: request.render,
    };
    for i in 1..=max {
        log.line(&format!(
            "\n{}\n",
            format!("━━━ Iteration {i}/{max} ━━━").bold().blue()
        ));
        match executor.run_iteration(&iteration, log) {
            Ok(outcome) if outcome.complete => {
                let noun = if i > 1 { "iterations" } else { "iteration" };
                log.line(&format!(
                    "\n{}",
                    format!("🎉 Spec complete after {i} {noun}.").green().bold()
                ));
                return (LoopResult::FullyComplete, i, None);
            }
            Ok(_) => {}
            Err(err) => {
                warn!(iteration = i, err = %err, "iteration failed");
                let reason = err.to_string();
                log.error(
                    &format!("Error in iteration {i}: {reason}")
                        .magenta()
                        .to_string(),
                );
                return (LoopResult::Error, i, Some(reason));
            }
        }
    }

    log.line(&format!(
        "\n{}",
        format!("⚠ Completed {max} iterations without spec completion.").yellow()
    ));
    (LoopResult::MaxIterationsReached, max, None)
}

fn print_banner(request: &LoopRequest, log: &SessionLog) {
    let mut title = "🔄 Ralph Loop".bold().cyan().to_string();
    if request.render.verbose {
        title.push_str(&format!(" {}", "(verbose)".dimmed()));
    }
    log.line(&title);
    let spec = request.spec.as_ref().map_or("-", |spec| spec.name.as_str());
    log.line(
        &format!("Spec: {spec} | Max iterations: {}", request.max_iterations)
            .dimmed()
            .to_string(),
    );
    if let Some(path) = log.transcript_path() {
        log.line(&format!("Log file: {}", path.display()).dimmed().to_string());
    }
    log.line(&"─".repeat(50).dimmed().to_string());
}
