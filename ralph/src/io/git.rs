//! Git plumbing for spec worktrees: add, list, remove, prune.
//!
//! Every call shells out to `git` in the project root and parses the
//! porcelain output, so behavior tracks the user's installed git.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// An uncommitted change that blocks creating a worktree from the checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyPath {
    /// Porcelain XY code; `??` for untracked files.
    pub code: String,
    /// Path relative to the project root (destination side of a rename).
    pub path: String,
}

/// One record of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Short branch name; `None` for a detached or bare worktree.
    pub branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uncommitted changes in the checkout, untracked files included.
    pub fn dirty_paths(&self) -> Result<Vec<DirtyPath>> {
        let out = self.stdout(&["status", "--porcelain=v1", "-uall"])?;
        out.lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_dirty_path)
            .collect()
    }

    /// Fail with the list of dirty paths unless the checkout is clean.
    #[instrument(skip_all)]
    pub fn ensure_clean(&self) -> Result<()> {
        let dirty = self.dirty_paths()?;
        if dirty.is_empty() {
            debug!("checkout is clean");
            return Ok(());
        }
        warn!(changed = dirty.len(), "checkout has uncommitted changes");
        let listing: Vec<String> = dirty
            .iter()
            .map(|entry| format!("{} {}", entry.code, entry.path))
            .collect();
        Err(anyhow!(
            "cannot create worktree: you have uncommitted changes; commit or stash them first:\n{}",
            listing.join("\n")
        ))
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{branch}");
        let output = self.output(&["show-ref", "--verify", "--quiet", &reference])?;
        Ok(output.status.success())
    }

    /// Add a linked worktree at `path` on `branch`, branching from HEAD when
    /// the branch does not exist yet.
    #[instrument(skip_all, fields(path = %path.display(), branch))]
    pub fn worktree_add(&self, path: &Path, branch: &str) -> Result<()> {
        let path_arg = path.to_string_lossy();
        if self.branch_exists(branch)? {
            debug!("checking out existing branch");
            self.checked(&["worktree", "add", &path_arg, branch])?;
        } else {
            debug!("creating branch for worktree");
            self.checked(&["worktree", "add", "-b", branch, &path_arg])?;
        }
        Ok(())
    }

    /// All worktrees known to the repository; the main worktree comes first.
    pub fn worktree_list(&self) -> Result<Vec<WorktreeEntry>> {
        let out = self.stdout(&["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out))
    }

    /// Remove a linked worktree, discarding any changes left in it.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn worktree_remove(&self, path: &Path) -> Result<()> {
        self.checked(&["worktree", "remove", "--force", &path.to_string_lossy()])?;
        debug!("worktree removed");
        Ok(())
    }

    /// Drop administrative records of worktrees whose directories are gone.
    pub fn worktree_prune(&self) -> Result<()> {
        self.checked(&["worktree", "prune"])?;
        Ok(())
    }

    pub fn branch_delete(&self, branch: &str) -> Result<()> {
        self.checked(&["branch", "-D", branch])?;
        debug!(branch, "deleted branch");
        Ok(())
    }

    fn stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.output(args)?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()))
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_dirty_path(line: &str) -> Result<DirtyPath> {
    let (code, rest) = match (line.get(..2), line.get(2..)) {
        (Some(code), Some(rest)) if rest.starts_with(' ') && rest.len() > 1 => (code, &rest[1..]),
        _ => return Err(anyhow!("unexpected porcelain line: '{line}'")),
    };
    let path = match rest.split_once(" -> ") {
        Some((_, renamed)) => renamed,
        None => rest,
    };
    Ok(DirtyPath {
        code: code.to_string(),
        path: path.trim().to_string(),
    })
}

/// Records are blank-line separated; each starts with `worktree <path>`.
fn parse_worktree_list(out: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;
    for line in out.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.extend(current.take());
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let (Some(reference), Some(entry)) =
            (line.strip_prefix("branch "), current.as_mut())
        {
            let name = reference.strip_prefix("refs/heads/").unwrap_or(reference);
            entry.branch = Some(name.to_string());
        }
    }
    entries.extend(current);
    entries
}
