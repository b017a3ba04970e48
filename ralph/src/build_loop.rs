//! Orchestration for `ralph build`: work a spec's plan until the agent reports completion.
//!
//! A build resolves the spec, requires its implementation plan, optionally moves
//! into a dedicated worktree, and runs the loop with the build prompt. Only a
//! fully complete loop moves the spec from the backlog to the complete directory.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use colored::Colorize;
use tracing::{debug, info};

use crate::core::render::RenderOptions;
use crate::io::config::RalphConfig;
use crate::io::executor::Executor;
use crate::io::prompt::render_build_prompt;
use crate::io::specs::SpecRepository;
use crate::io::worktree::WorktreeManager;
use crate::looping::{LoopOutcome, LoopRequest, LoopResult, run_loop};
use crate::spec::Spec;

/// Options for `ralph build`.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    pub spec: String,
    /// Overrides `default_iterations` from config.
    pub iterations: Option<u32>,
    pub create_worktree: bool,
    pub verbose: bool,
}

/// Outcome of `ralph build`.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub spec: Spec,
    pub workdir: PathBuf,
    pub loop_outcome: LoopOutcome,
    /// New folder of the spec when it was moved to the complete directory.
    pub completed_path: Option<PathBuf>,
}

impl BuildOutcome {
    pub fn exit_code(&self) -> i32 {
        self.loop_outcome.result.exit_code()
    }
}

pub fn run_build<E: Executor>(
    root: &Path,
    config: &RalphConfig,
    executor: &E,
    build: &BuildConfig,
) -> Result<BuildOutcome> {
    let repo = SpecRepository::new(root, &config.specs);
    let spec = repo.resolve(&build.spec)?;

    if !spec.has_plan() {
        let plan = spec
            .plan_path
            .clone()
            .unwrap_or_else(|| spec.folder.join(&config.specs.plan_file));
        bail!(
            "{} not found at: {}\nRun `ralph plan {}` first to create an implementation plan.",
            config.specs.plan_file,
            plan.display(),
            spec.name
        );
    }

    let workdir = if build.create_worktree {
        println!("{}", "Creating worktree...".cyan());
        let path = WorktreeManager::new(root, config.worktree.clone()).create(&spec.name)?;
        println!("{}", format!("Worktree created: {}", path.display()).cyan());
        path
    } else {
        root.to_path_buf()
    };

    println!("{}\n", format!("Building: {}", spec.name).cyan());
    let prompt = render_build_prompt(&spec)?;
    let max_iterations = build.iterations.unwrap_or(config.default_iterations);
    debug!(spec = %spec.name, max_iterations, workdir = %workdir.display(), "starting build");

    let request = LoopRequest {
        prompt,
        workdir: workdir.clone(),
        max_iterations,
        spec: Some(spec.clone()),
        render: RenderOptions {
            verbose: build.verbose || config.agent.verbose,
        },
    };
    let loop_outcome = run_loop(executor, &request)?;

    let completed_path = match loop_outcome.result {
        LoopResult::FullyComplete if repo.is_completed(&spec) => {
            println!(
                "{}",
                format!("Spec '{}' is already complete.", spec.name).green()
            );
            None
        }
        LoopResult::FullyComplete => {
            let moved = repo.complete(&spec)?;
            info!(spec = %spec.name, "spec completed");
            println!(
                "{}",
                format!("Spec '{}' moved to complete.", spec.name).green()
            );
            Some(moved)
        }
        LoopResult::Error | LoopResult::MaxIterationsReached => None,
    };

    Ok(BuildOutcome {
        spec,
        workdir,
        loop_outcome,
        completed_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::core::completion::COMPLETION_MARKER;
    use crate::exit_codes;
    use crate::test_support::{ScriptedExecutor, ScriptedIteration, SpecFixture};

    fn build(spec: &str, iterations: u32) -> BuildConfig {
        BuildConfig {
            spec: spec.to_string(),
            iterations: Some(iterations),
            ..BuildConfig::default()
        }
    }

    fn done() -> ScriptedIteration {
        ScriptedIteration::Text(format!("Done. {COMPLETION_MARKER}"))
    }

    #[test]
    fn completion_moves_spec_with_its_logs() {
        let fx = SpecFixture::new().expect("fixture");
        fx.add_spec("2025-03-01-auth", true).expect("spec");
        let executor = ScriptedExecutor::new(vec![done()]);

        let outcome =
            run_build(fx.root(), &RalphConfig::default(), &executor, &build("auth", 5))
                .expect("build");

        assert_eq!(outcome.exit_code(), exit_codes::OK);
        let moved = outcome.completed_path.expect("moved");
        assert_eq!(moved, fx.root().join("specs/complete/2025-03-01-auth"));
        assert!(!outcome.spec.folder.exists());
        let logs: Vec<_> = fs::read_dir(moved.join("logs"))
            .expect("logs")
            .collect::<std::io::Result<_>>()
            .expect("entries");
        assert_eq!(logs.len(), 2);
        assert_eq!(outcome.workdir, fx.root());
    }

    #[test]
    fn completing_a_spec_from_the_complete_dir_keeps_it_there() {
        let fx = SpecFixture::new().expect("fixture");
        let folder = fx.root().join("specs/complete/auth");
        fs::create_dir_all(&folder).expect("complete dir");
        fs::write(folder.join("PRD.md"), "# auth\n").expect("prd");
        fs::write(folder.join("IMPLEMENTATION_PLAN.md"), "- [x] done\n").expect("plan");
        let executor = ScriptedExecutor::new(vec![done()]);

        let outcome =
            run_build(fx.root(), &RalphConfig::default(), &executor, &build("auth", 3))
                .expect("build");

        assert_eq!(executor.calls(), 1);
        assert_eq!(outcome.exit_code(), exit_codes::OK);
        assert_eq!(outcome.completed_path, None);
        assert!(folder.join("PRD.md").is_file());
        assert!(folder.join("logs").is_dir());
    }

    #[test]
    fn exhausted_or_failed_builds_stay_in_backlog() {
        let fx = SpecFixture::new().expect("fixture");
        let folder = fx.add_spec("auth", true).expect("spec");

        let progress = ScriptedIteration::Text("one task done".to_string());
        let executor = ScriptedExecutor::new(vec![progress.clone(), progress]);
        let outcome =
            run_build(fx.root(), &RalphConfig::default(), &executor, &build("auth", 2))
                .expect("build");
        assert_eq!(outcome.exit_code(), exit_codes::MAX_ITERATIONS);
        assert_eq!(outcome.completed_path, None);
        assert!(folder.is_dir());

        let executor = ScriptedExecutor::new(vec![ScriptedIteration::Fail(1)]);
        let outcome =
            run_build(fx.root(), &RalphConfig::default(), &executor, &build("auth", 2))
                .expect("build");
        assert_eq!(outcome.exit_code(), exit_codes::ERROR);
        assert_eq!(outcome.completed_path, None);
        assert!(folder.is_dir());
    }

    #[test]
    fn missing_plan_points_at_the_plan_command() {
        let fx = SpecFixture::new().expect("fixture");
        fx.add_spec("auth", false).expect("spec");
        let executor = ScriptedExecutor::new(vec![done()]);

        let err = run_build(fx.root(), &RalphConfig::default(), &executor, &build("auth", 5))
            .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("IMPLEMENTATION_PLAN.md not found"), "{msg}");
        assert!(msg.contains("ralph plan auth"), "{msg}");
        assert_eq!(executor.calls(), 0);
    }

    #[test]
    fn unknown_spec_is_an_error() {
        let fx = SpecFixture::new().expect("fixture");
        let executor = ScriptedExecutor::new(vec![done()]);
        let err = run_build(fx.root(), &RalphConfig::default(), &executor, &build("nope", 5))
            .unwrap_err();
        assert!(format!("{err:#}").contains("spec not found: nope"));
    }

    #[test]
    fn uses_build_prompt_and_default_iterations() {
        let fx = SpecFixture::new().expect("fixture");
        fx.add_spec("auth", true).expect("spec");
        let config = RalphConfig {
            default_iterations: 2,
            ..RalphConfig::default()
        };
        let progress = ScriptedIteration::Text("working".to_string());
        let executor = ScriptedExecutor::new(vec![progress.clone(), progress]);
        let options = BuildConfig {
            spec: "auth".to_string(),
            ..BuildConfig::default()
        };

        let outcome = run_build(fx.root(), &config, &executor, &options).expect("build");
        assert_eq!(outcome.loop_outcome.iterations_run, 2);
        let prompts = executor.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("ONLY WORK ON A SINGLE TASK"));
        assert!(prompts[0].contains("IMPLEMENTATION_PLAN.md"));
    }
}
