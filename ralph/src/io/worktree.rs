//! Isolated git worktrees so concurrent loops on different specs do not collide.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::{Captures, Regex};
use tracing::{debug, info, instrument};

use crate::io::config::WorktreeConfig;
use crate::io::git::{Git, WorktreeEntry};

static APP_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(APP_URL\s*=\s*)(https?://)([^:\s]+)(.*)$").expect("APP_URL pattern is valid")
});

/// Creates and removes `<parent>/<project>-<spec>` worktrees on `<branch_prefix><spec>`.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    root: PathBuf,
    config: WorktreeConfig,
}

impl WorktreeManager {
    pub fn new(root: impl Into<PathBuf>, config: WorktreeConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Sibling directory of the project root named `<project>-<spec>`. No side effects.
    pub fn worktree_path(&self, spec: &str) -> Result<PathBuf> {
        let project = self
            .root
            .file_name()
            .with_context(|| format!("project root has no name {}", self.root.display()))?;
        let parent = self
            .root
            .parent()
            .with_context(|| format!("project root has no parent {}", self.root.display()))?;
        Ok(parent.join(format!("{}-{spec}", project.to_string_lossy())))
    }

    pub fn branch_name(&self, spec: &str) -> String {
        format!("{}{spec}", self.config.branch_prefix)
    }

    /// Create (or reuse) the worktree for `spec` and run setup steps in it.
    ///
    /// Refuses to start from a dirty checkout. An existing worktree directory
    /// is reused as-is; setup steps still run.
    #[instrument(skip(self))]
    pub fn create(&self, spec: &str) -> Result<PathBuf> {
        let git = Git::new(&self.root);
        git.ensure_clean()?;

        let path = self.worktree_path(spec)?;
        if path.is_dir() {
            debug!(path = %path.display(), "worktree already exists");
        } else {
            git.worktree_add(&path, &self.branch_name(spec))
                .context("create git worktree")?;
            info!(path = %path.display(), "created worktree");
        }

        if self.config.copy_env {
            copy_env_file(&self.root, &path, spec)?;
        }
        for command in &self.config.setup_commands {
            run_setup_command(command, &path)?;
        }
        Ok(path)
    }

    /// Remove the linked worktree for `spec`, or every linked worktree when
    /// `spec` is `None`, then prune stale records. The main worktree is never
    /// touched. With `delete_branch`, branches under `branch_prefix` that the
    /// removed worktrees had checked out are deleted too.
    #[instrument(skip(self))]
    pub fn remove(&self, spec: Option<&str>, delete_branch: bool) -> Result<Vec<WorktreeEntry>> {
        let git = Git::new(&self.root);
        let linked = git.worktree_list()?.into_iter().skip(1);
        let selected: Vec<WorktreeEntry> = match spec {
            Some(spec) => {
                let target = comparable(&self.worktree_path(spec)?);
                let matching: Vec<_> = linked
                    .filter(|entry| comparable(&entry.path) == target)
                    .collect();
                if matching.is_empty() {
                    return Err(anyhow!(
                        "no worktree for spec {spec} at {}",
                        target.display()
                    ));
                }
                matching
            }
            None => linked.collect(),
        };

        for entry in &selected {
            info!(path = %entry.path.display(), "removing worktree");
            git.worktree_remove(&entry.path)?;
        }
        git.worktree_prune()?;

        if delete_branch {
            let owned = selected
                .iter()
                .filter_map(|entry| entry.branch.as_deref())
                .filter(|branch| branch.starts_with(&self.config.branch_prefix));
            for branch in owned {
                git.branch_delete(branch)?;
            }
        }
        Ok(selected)
    }
}

fn comparable(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Rewrite the host of every `APP_URL` line so each worktree gets its own
/// local domain: `myapp.test` becomes `myapp-<spec>.test`.
pub fn rewrite_app_url<'a>(contents: &'a str, spec: &str) -> Cow<'a, str> {
    APP_URL_RE.replace_all(contents, |caps: &Captures<'_>| {
        let host = &caps[3];
        let host = match host.rfind('.') {
            Some(dot) => format!("{}-{spec}{}", &host[..dot], &host[dot..]),
            None => format!("{host}-{spec}"),
        };
        format!("{}{}{host}{}", &caps[1], &caps[2], &caps[4])
    })
}

/// Copy `.env` from `source` into `worktree` with a per-spec `APP_URL`.
/// Returns `false` when there is no `.env` to copy.
fn copy_env_file(source: &Path, worktree: &Path, spec: &str) -> Result<bool> {
    let source_env = source.join(".env");
    if !source_env.is_file() {
        debug!("no .env to copy");
        return Ok(false);
    }
    let contents = fs::read_to_string(&source_env)
        .with_context(|| format!("read {}", source_env.display()))?;
    let target = worktree.join(".env");
    fs::write(&target, rewrite_app_url(&contents, spec).as_bytes())
        .with_context(|| format!("write {}", target.display()))?;
    Ok(true)
}

fn run_setup_command(command: &str, dir: &Path) -> Result<()> {
    info!(command, dir = %dir.display(), "running worktree setup command");
    let status = shell(command)
        .current_dir(dir)
        .status()
        .with_context(|| format!("spawn setup command `{command}`"))?;
    if !status.success() {
        return Err(anyhow!(
            "setup command `{command}` failed with status {:?}",
            status.code()
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
