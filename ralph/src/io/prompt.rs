//! Prompt rendering for the `build` and `plan` commands.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::completion::COMPLETION_MARKER;
use crate::spec::Spec;

const BUILD_TEMPLATE: &str = include_str!("prompts/build.md");
const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("build", BUILD_TEMPLATE)
            .context("load build template")?;
        env.add_template("plan", PLAN_TEMPLATE)
            .context("load plan template")?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))?;
        debug!(template = name, bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}

/// Build prompt: work one plan item per iteration. Requires a plan path.
pub fn render_build_prompt(spec: &Spec) -> Result<String> {
    let plan_path = spec
        .plan_path
        .as_deref()
        .with_context(|| format!("spec {} has no plan path", spec.name))?;
    PromptEngine::new()?.render(
        "build",
        context! {
            requirements_path => display(&spec.requirements_path),
            plan_path => display(plan_path),
            completion_marker => COMPLETION_MARKER,
        },
    )
}

/// Plan prompt: analyze the codebase and write the implementation plan.
///
/// The existing plan is only referenced as input when it exists on disk.
pub fn render_plan_prompt(spec: &Spec, plan_target: &Path) -> Result<String> {
    let requirements_file = spec
        .requirements_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let existing_plan = spec
        .plan_path
        .as_deref()
        .filter(|path| path.is_file())
        .map(display);
    PromptEngine::new()?.render(
        "plan",
        context! {
            requirements_path => display(&spec.requirements_path),
            requirements_file => requirements_file,
            plan_path => existing_plan,
            plan_target => display(plan_target),
            completion_marker => COMPLETION_MARKER,
        },
    )
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
