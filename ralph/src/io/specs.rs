//! Spec folders under the project's backlog and complete directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::io::config::SpecsConfig;
use crate::spec::Spec;

static DATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}-(.+)$").expect("dated spec pattern is valid"));

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("spec not found: {0}")]
    NotFound(String),
    #[error("{} missing for spec {name}", .path.display())]
    MissingRequirements { name: String, path: PathBuf },
    #[error("no specs found in {}", .0.display())]
    NoBacklog(PathBuf),
}

/// Filesystem-backed spec lookup rooted at a project directory.
#[derive(Debug, Clone)]
pub struct SpecRepository {
    backlog_dir: PathBuf,
    complete_dir: PathBuf,
    requirements_file: String,
    plan_file: String,
}

impl SpecRepository {
    pub fn new(root: &Path, config: &SpecsConfig) -> Self {
        Self {
            backlog_dir: root.join(&config.backlog_dir),
            complete_dir: root.join(&config.complete_dir),
            requirements_file: config.requirements_file.clone(),
            plan_file: config.plan_file.clone(),
        }
    }

    /// Names of spec folders in the backlog, sorted. Plain files are ignored.
    pub fn backlog_specs(&self) -> Result<Vec<String>> {
        list_dirs(&self.backlog_dir)
    }

    /// Like [`SpecRepository::backlog_specs`], but an empty backlog is an error.
    pub fn require_backlog_specs(&self) -> Result<Vec<String>> {
        let specs = self.backlog_specs()?;
        if specs.is_empty() {
            return Err(SpecError::NoBacklog(self.backlog_dir.clone()).into());
        }
        Ok(specs)
    }

    /// Resolve `name` to a spec folder containing the requirements file.
    ///
    /// Exact folder names win (backlog before complete); otherwise the first
    /// date-prefixed folder (`YYYY-MM-DD-<rest>`) whose `rest` equals `name`
    /// or whose full name contains `name`.
    #[instrument(skip(self))]
    pub fn resolve(&self, name: &str) -> Result<Spec> {
        let folder = self
            .find_folder(name)?
            .ok_or_else(|| SpecError::NotFound(name.to_string()))?;
        let folder = fs::canonicalize(&folder)
            .with_context(|| format!("canonicalize {}", folder.display()))?;
        let requirements_path = folder.join(&self.requirements_file);
        let spec_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        if !requirements_path.is_file() {
            return Err(SpecError::MissingRequirements {
                name: spec_name,
                path: requirements_path,
            }
            .into());
        }
        let plan_path = folder.join(&self.plan_file);
        debug!(spec = %spec_name, folder = %folder.display(), "resolved spec");
        Ok(Spec {
            name: spec_name,
            folder,
            requirements_path,
            plan_path: Some(plan_path),
        })
    }

    fn find_folder(&self, name: &str) -> Result<Option<PathBuf>> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Ok(None);
        }
        let dirs = [&self.backlog_dir, &self.complete_dir];
        for dir in dirs {
            let exact = dir.join(name);
            if exact.is_dir() {
                return Ok(Some(exact));
            }
        }
        for dir in dirs {
            for entry in list_dirs(dir)? {
                if dated_match(&entry, name) {
                    return Ok(Some(dir.join(entry)));
                }
            }
        }
        Ok(None)
    }

    /// Whether the spec folder already sits directly in the complete directory.
    pub fn is_completed(&self, spec: &Spec) -> bool {
        let complete_dir =
            fs::canonicalize(&self.complete_dir).unwrap_or_else(|_| self.complete_dir.clone());
        spec.folder.parent() == Some(complete_dir.as_path())
    }

    /// Move the spec folder into the complete directory; returns its new path.
    ///
    /// A spec that is already complete stays where it is.
    #[instrument(skip_all, fields(spec = %spec.name))]
    pub fn complete(&self, spec: &Spec) -> Result<PathBuf> {
        if self.is_completed(spec) {
            debug!(folder = %spec.folder.display(), "spec already complete");
            return Ok(spec.folder.clone());
        }
        fs::create_dir_all(&self.complete_dir)
            .with_context(|| format!("create directory {}", self.complete_dir.display()))?;
        let file_name = spec
            .folder
            .file_name()
            .with_context(|| format!("spec folder has no name {}", spec.folder.display()))?;
        let target = self.complete_dir.join(file_name);
        if target.exists() {
            anyhow::bail!("cannot complete spec: {} already exists", target.display());
        }
        fs::rename(&spec.folder, &target).with_context(|| {
            format!(
                "move {} to {}",
                spec.folder.display(),
                target.display()
            )
        })?;
        info!(target = %target.display(), "moved spec to complete");
        Ok(target)
    }
}

fn dated_match(entry: &str, name: &str) -> bool {
    DATED_RE
        .captures(entry)
        .and_then(|caps| caps.get(1))
        .is_some_and(|rest| rest.as_str() == name || entry.contains(name))
}

fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
