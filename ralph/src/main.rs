//! `ralph`: drive the `claude` CLI through a spec until it reports completion.
//!
//! Specs live under `specs/backlog/<name>/` with a `PRD.md` and, once planned,
//! an `IMPLEMENTATION_PLAN.md`. Exit codes follow [`ralph::exit_codes`].

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use ralph::build_loop::{BuildConfig, run_build};
use ralph::core::render::RenderOptions;
use ralph::exit_codes;
use ralph::io::config::{CONFIG_FILE, RalphConfig, load_config, write_config};
use ralph::io::executor::ClaudeExecutor;
use ralph::io::specs::SpecRepository;
use ralph::io::worktree::WorktreeManager;
use ralph::logging;
use ralph::looping::{LoopRequest, run_loop};
use ralph::plan_loop::{PlanConfig, run_plan};

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Agent loop runner: iterate the claude CLI over a spec until it is complete"
)]
struct Cli {
    /// Config file (default: `<root>/ralph.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Project root containing the specs directories (default: current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Work through a spec's implementation plan until the agent reports completion.
    Build {
        /// Spec folder name, or the name after its `YYYY-MM-DD-` prefix.
        spec: String,
        /// Maximum iterations (default: `default_iterations` from config).
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
        iterations: Option<u32>,
        /// Run inside a dedicated git worktree next to the project.
        #[arg(long)]
        create_worktree: bool,
        /// Show file and command output previews.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Create the implementation plan for a spec in a single iteration.
    Plan {
        spec: String,
        /// Regenerate the plan even if it exists.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        create_worktree: bool,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Run the loop with an arbitrary prompt.
    Run(RunArgs),
    /// List specs in the backlog.
    List,
    /// Write a default `ralph.toml`.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Manage spec worktrees created with `--create-worktree`.
    Worktree {
        #[command(subcommand)]
        command: WorktreeCommand,
    },
}

#[derive(Subcommand)]
enum WorktreeCommand {
    /// Remove the worktree for a spec, or every linked worktree without one.
    Remove {
        spec: Option<String>,
        /// Also delete the worktree's branch.
        #[arg(long)]
        delete_branch: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Prompt text passed to the agent on every iteration.
    #[arg(long, required_unless_present = "prompt_file", conflicts_with = "prompt_file")]
    prompt: Option<String>,
    /// Read the prompt from a file.
    #[arg(long)]
    prompt_file: Option<PathBuf>,
    /// Spec whose folder receives the session logs.
    #[arg(long)]
    spec: Option<String>,
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
    iterations: Option<u32>,
    /// Agent working directory (default: project root).
    #[arg(short = 'C', long)]
    workdir: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    logging::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Usage errors must not collide with the max-iterations exit code.
            let code = if err.use_stderr() {
                exit_codes::ERROR
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            process::exit(code);
        }
    };
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{}", format!("{err:#}").magenta());
            process::exit(exit_codes::ERROR);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let root = fs::canonicalize(&root)
        .with_context(|| format!("project root {}", root.display()))?;
    let config_path = cli.config.unwrap_or_else(|| root.join(CONFIG_FILE));
    match cli.command {
        Command::Build {
            spec,
            iterations,
            create_worktree,
            verbose,
        } => {
            let (config, executor) = load(&root, &config_path)?;
            let build = BuildConfig {
                spec,
                iterations,
                create_worktree,
                verbose,
            };
            Ok(run_build(&root, &config, &executor, &build)?.exit_code())
        }
        Command::Plan {
            spec,
            force,
            create_worktree,
            verbose,
        } => {
            let (config, executor) = load(&root, &config_path)?;
            let plan = PlanConfig {
                spec,
                force,
                create_worktree,
                verbose,
            };
            Ok(run_plan(&root, &config, &executor, &plan)?.exit_code())
        }
        Command::Run(args) => {
            let (config, executor) = load(&root, &config_path)?;
            cmd_run(&root, &config, &executor, args)
        }
        Command::List => {
            let (config, _) = load(&root, &config_path)?;
            cmd_list(&root, &config)
        }
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Worktree {
            command: WorktreeCommand::Remove {
                spec,
                delete_branch,
            },
        } => {
            let config = load_config(&config_path)?;
            cmd_worktree_remove(&root, &config, spec.as_deref(), delete_branch)
        }
    }
}

fn load(root: &Path, config_path: &Path) -> Result<(RalphConfig, ClaudeExecutor)> {
    let config = load_config(config_path)?;
    debug!(root = %root.display(), config = %config_path.display(), "loaded config");
    let executor = ClaudeExecutor::new(config.agent.program.clone());
    Ok((config, executor))
}

fn cmd_run(root: &Path, config: &RalphConfig, executor: &ClaudeExecutor, args: RunArgs) -> Result<i32> {
    let prompt = match (args.prompt, args.prompt_file) {
        (Some(prompt), _) => prompt,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("read prompt file {}", path.display()))?,
        (None, None) => bail!("either --prompt or --prompt-file is required"),
    };
    if prompt.trim().is_empty() {
        bail!("prompt is empty");
    }
    let spec = args
        .spec
        .map(|name| SpecRepository::new(root, &config.specs).resolve(&name))
        .transpose()?;
    let request = LoopRequest {
        prompt,
        workdir: args.workdir.unwrap_or_else(|| root.to_path_buf()),
        max_iterations: args.iterations.unwrap_or(config.default_iterations),
        spec,
        render: RenderOptions {
            verbose: args.verbose || config.agent.verbose,
        },
    };
    Ok(run_loop(executor, &request)?.result.exit_code())
}

fn cmd_list(root: &Path, config: &RalphConfig) -> Result<i32> {
    let specs = SpecRepository::new(root, &config.specs).require_backlog_specs()?;
    for name in specs {
        println!("{name}");
    }
    Ok(exit_codes::OK)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists; use --force to overwrite",
            config_path.display()
        );
    }
    write_config(config_path, &RalphConfig::default())?;
    println!("{}", format!("Wrote {}", config_path.display()).green());
    Ok(exit_codes::OK)
}

fn cmd_worktree_remove(
    root: &Path,
    config: &RalphConfig,
    spec: Option<&str>,
    delete_branch: bool,
) -> Result<i32> {
    // Worktrees are named after the resolved folder, so `auth` finds `2025-01-01-auth`.
    let spec = spec.map(|name| {
        SpecRepository::new(root, &config.specs)
            .resolve(name)
            .map(|spec| spec.name)
            .unwrap_or_else(|_| name.to_string())
    });
    let manager = WorktreeManager::new(root, config.worktree.clone());
    let removed = manager.remove(spec.as_deref(), delete_branch)?;
    if removed.is_empty() {
        println!(
            "{}",
            "No removable worktrees found (only the main worktree exists).".yellow()
        );
        return Ok(exit_codes::OK);
    }
    for entry in &removed {
        println!("{}", format!("Removed: {}", entry.path.display()).green());
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_build_with_options() {
        let cli = Cli::parse_from(["ralph", "build", "auth", "-n", "5", "--create-worktree", "-v"]);
        match cli.command {
            Command::Build {
                spec,
                iterations,
                create_worktree,
                verbose,
            } => {
                assert_eq!(spec, "auth");
                assert_eq!(iterations, Some(5));
                assert!(create_worktree);
                assert!(verbose);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn parse_plan_force_and_global_flags() {
        let cli = Cli::parse_from(["ralph", "plan", "auth", "--force", "--root", "/tmp/p"]);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/p")));
        assert!(matches!(cli.command, Command::Plan { force: true, .. }));
    }

    #[test]
    fn zero_iterations_is_rejected() {
        assert!(Cli::try_parse_from(["ralph", "build", "auth", "-n", "0"]).is_err());
    }

    #[test]
    fn run_requires_exactly_one_prompt_source() {
        assert!(Cli::try_parse_from(["ralph", "run"]).is_err());
        assert!(
            Cli::try_parse_from(["ralph", "run", "--prompt", "p", "--prompt-file", "f"]).is_err()
        );
        let cli = Cli::parse_from(["ralph", "run", "--prompt-file", "p.md", "-C", "/w"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.prompt_file, Some(PathBuf::from("p.md")));
                assert_eq!(args.workdir, Some(PathBuf::from("/w")));
                assert_eq!(args.prompt, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_list_and_init() {
        let cli = Cli::parse_from(["ralph", "list"]);
        assert!(matches!(cli.command, Command::List));
        let cli = Cli::parse_from(["ralph", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_worktree_remove() {
        let cli = Cli::parse_from(["ralph", "worktree", "remove", "auth", "--delete-branch"]);
        match cli.command {
            Command::Worktree {
                command: WorktreeCommand::Remove {
                    spec,
                    delete_branch,
                },
            } => {
                assert_eq!(spec.as_deref(), Some("auth"));
                assert!(delete_branch);
            }
            _ => panic!("expected worktree remove"),
        }
        let cli = Cli::parse_from(["ralph", "worktree", "remove"]);
        assert!(matches!(
            cli.command,
            Command::Worktree {
                command: WorktreeCommand::Remove {
                    spec: None,
                    delete_branch: false,
                },
            }
        ));
        assert!(Cli::try_parse_from(["ralph", "worktree"]).is_err());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        assert_eq!(cmd_init(&path, false).expect("init"), exit_codes::OK);
        assert_eq!(load_config(&path).expect("load"), RalphConfig::default());

        fs::write(&path, "default_iterations = 7\n").expect("write");
        let err = cmd_init(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(load_config(&path).expect("load").default_iterations, 7);

        cmd_init(&path, true).expect("forced init");
        assert_eq!(load_config(&path).expect("load").default_iterations, 30);
    }
}
