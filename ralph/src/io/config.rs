//! Project configuration stored in `ralph.toml` at the project root.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::executor::DEFAULT_AGENT_PROGRAM;

/// Default config file name, relative to the project root.
pub const CONFIG_FILE: &str = "ralph.toml";

/// Loop runner configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults, so an
/// absent file behaves like an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphConfig {
    /// Iteration budget for `ralph build` and `ralph run` when `-n` is not given.
    pub default_iterations: u32,
    pub agent: AgentConfig,
    pub specs: SpecsConfig,
    pub worktree: WorktreeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent binary, resolved through `PATH` unless absolute.
    pub program: String,
    /// Render file and command previews.
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpecsConfig {
    pub backlog_dir: String,
    pub complete_dir: String,
    pub requirements_file: String,
    pub plan_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorktreeConfig {
    /// Branch name is `<branch_prefix><spec>`.
    pub branch_prefix: String,
    /// Copy `.env` into new worktrees, rewriting the `APP_URL` host.
    pub copy_env: bool,
    /// Shell commands run in order inside a new worktree (e.g. `npm install`).
    pub setup_commands: Vec<String>,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            default_iterations: 30,
            agent: AgentConfig::default(),
            specs: SpecsConfig::default(),
            worktree: WorktreeConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_AGENT_PROGRAM.to_string(),
            verbose: false,
        }
    }
}

impl Default for SpecsConfig {
    fn default() -> Self {
        Self {
            backlog_dir: "specs/backlog".to_string(),
            complete_dir: "specs/complete".to_string(),
            requirements_file: "PRD.md".to_string(),
            plan_file: "IMPLEMENTATION_PLAN.md".to_string(),
        }
    }
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            branch_prefix: "ralph/".to_string(),
            copy_env: true,
            setup_commands: Vec::new(),
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_iterations == 0 {
            return Err(anyhow!("default_iterations must be > 0"));
        }
        if self.agent.program.trim().is_empty() {
            return Err(anyhow!("agent.program must be non-empty"));
        }
        for (key, value) in [
            ("specs.backlog_dir", &self.specs.backlog_dir),
            ("specs.complete_dir", &self.specs.complete_dir),
            ("specs.requirements_file", &self.specs.requirements_file),
            ("specs.plan_file", &self.specs.plan_file),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{key} must be non-empty"));
            }
        }
        if self.specs.backlog_dir == self.specs.complete_dir {
            return Err(anyhow!("specs.backlog_dir and specs.complete_dir must differ"));
        }
        if self
            .worktree
            .setup_commands
            .iter()
            .any(|cmd| cmd.trim().is_empty())
        {
            return Err(anyhow!("worktree.setup_commands must not contain empty commands"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
