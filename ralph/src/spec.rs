//! Resolved work item handed to the loop runner.

use std::path::{Path, PathBuf};

/// A spec folder with its requirements document and optional plan.
///
/// Paths are absolute; the loop only derives its log directory from `folder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    pub name: String,
    pub folder: PathBuf,
    pub requirements_path: PathBuf,
    pub plan_path: Option<PathBuf>,
}

impl Spec {
    /// Whether the plan file is set and exists on disk.
    pub fn has_plan(&self) -> bool {
        self.plan_path.as_deref().is_some_and(Path::is_file)
    }
}
