//! Orchestration for `ralph plan`: a single iteration that writes the implementation plan.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use colored::Colorize;
use tracing::{debug, warn};

use crate::core::render::RenderOptions;
use crate::exit_codes;
use crate::io::config::RalphConfig;
use crate::io::executor::Executor;
use crate::io::prompt::render_plan_prompt;
use crate::io::specs::SpecRepository;
use crate::io::worktree::WorktreeManager;
use crate::looping::{LoopOutcome, LoopRequest, LoopResult, run_loop};
use crate::spec::Spec;

/// Options for `ralph plan`.
#[derive(Debug, Clone, Default)]
pub struct PlanConfig {
    pub spec: String,
    /// Regenerate the plan even when it exists.
    pub force: bool,
    pub create_worktree: bool,
    pub verbose: bool,
}

/// Outcome of `ralph plan`.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub spec: Spec,
    pub plan_path: PathBuf,
    pub loop_outcome: LoopOutcome,
    /// Whether the plan file exists after the run.
    pub plan_created: bool,
}

impl PlanOutcome {
    /// Planning has no completion requirement: only a failed iteration is an error.
    pub fn exit_code(&self) -> i32 {
        match self.loop_outcome.result {
            LoopResult::Error => exit_codes::ERROR,
            LoopResult::FullyComplete | LoopResult::MaxIterationsReached => exit_codes::OK,
        }
    }
}

pub fn run_plan<E: Executor>(
    root: &Path,
    config: &RalphConfig,
    executor: &E,
    plan: &PlanConfig,
) -> Result<PlanOutcome> {
    let repo = SpecRepository::new(root, &config.specs);
    let spec = repo.resolve(&plan.spec)?;
    let plan_path = spec
        .plan_path
        .clone()
        .unwrap_or_else(|| spec.folder.join(&config.specs.plan_file));

    if plan_path.is_file() && !plan.force {
        bail!(
            "{} already exists at: {}\nUse --force to regenerate.",
            config.specs.plan_file,
            plan_path.display()
        );
    }

    let workdir = if plan.create_worktree {
        println!("{}", "Creating worktree...".cyan());
        let path = WorktreeManager::new(root, config.worktree.clone()).create(&spec.name)?;
        println!("{}", format!("Worktree created: {}", path.display()).cyan());
        path
    } else {
        root.to_path_buf()
    };

    println!(
        "{}\n",
        format!("Creating implementation plan for: {}", spec.name).cyan()
    );
    let prompt = render_plan_prompt(&spec, &plan_path)?;
    debug!(spec = %spec.name, workdir = %workdir.display(), "starting plan");

    let request = LoopRequest {
        prompt,
        workdir,
        max_iterations: 1,
        spec: Some(spec.clone()),
        render: RenderOptions {
            verbose: plan.verbose || config.agent.verbose,
        },
    };
    let loop_outcome = run_loop(executor, &request)?;

    let plan_created = plan_path.is_file();
    if loop_outcome.result != LoopResult::Error {
        println!();
        if plan_created {
            println!(
                "{}",
                format!("Implementation plan created: {}", plan_path.display()).green()
            );
        } else {
            warn!(plan = %plan_path.display(), "agent finished without writing the plan");
            println!(
                "{}",
                format!(
                    "Agent completed but {} was not created.",
                    config.specs.plan_file
                )
                .yellow()
            );
            println!("You may need to run the command again or create it manually.");
        }
    }

    Ok(PlanOutcome {
        spec,
        plan_path,
        loop_outcome,
        plan_created,
    })
}
