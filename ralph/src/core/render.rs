//! Human-readable, colorized summaries of decoded agent events.

use std::path::Path;

use colored::Colorize;
use serde_json::Value;

use super::event::{ContentBlock, Event, RunSummary, ToolResult};

/// Characters shown from file contents and command output in verbose mode.
pub const OUTPUT_PREVIEW_CHARS: usize = 300;
/// Characters shown from tool error payloads.
pub const ERROR_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Show content previews instead of bare summaries.
    pub verbose: bool,
}

/// Render an event to a display line (possibly multi-line), or `None` when
/// there is nothing worth showing.
pub fn render_event(event: &Event, options: &RenderOptions) -> Option<String> {
    match event {
        Event::SystemInit { model } => Some(format!(
            "{} {}",
            "● Session started".cyan(),
            format!("({model})").dimmed()
        )),
        Event::System { .. } => None,
        Event::AssistantMessage { blocks } => render_blocks(blocks),
        Event::ToolResult(result) => render_tool_result(result, options),
        Event::RunResult(summary) => Some(render_run_result(summary)),
    }
}

fn render_blocks(blocks: &[ContentBlock]) -> Option<String> {
    let parts: Vec<String> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) if !text.trim().is_empty() => {
                Some(text.as_str().white().to_string())
            }
            ContentBlock::Text(_) => None,
            ContentBlock::ToolUse { name, input } => Some(render_tool_use(name, input)),
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}

fn render_tool_use(name: &str, input: &Value) -> String {
    let mut line = format!("⚡ {name}").yellow().to_string();
    if let Some(detail) = tool_detail(input) {
        line.push_str("\n   ");
        line.push_str(&detail.dimmed().to_string());
    }
    line
}

/// Most informative input field: shell command, then file path, then search pattern.
fn tool_detail(input: &Value) -> Option<String> {
    let field = |key: &str| {
        input
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    };
    if let Some(command) = field("command") {
        return Some(format!("$ {command}"));
    }
    if let Some(path) = field("file_path") {
        return Some(path.to_string());
    }
    field("pattern").map(|pattern| format!("pattern: {pattern}"))
}

fn render_tool_result(result: &ToolResult, options: &RenderOptions) -> Option<String> {
    match result {
        ToolResult::FileRead {
            path,
            num_lines,
            content,
        } => {
            let mut line = format!("→ {} ({num_lines} lines)", base_name(path));
            if options.verbose {
                line.push('\n');
                line.push_str(&preview(content, OUTPUT_PREVIEW_CHARS));
            }
            Some(line.bright_black().to_string())
        }
        ToolResult::CommandOutput { stdout, stderr } => {
            let output = if stdout.is_empty() { stderr } else { stdout };
            let line = if output.trim().is_empty() {
                "→ (no output)".to_string()
            } else if options.verbose {
                format!("→ {}", preview(output, OUTPUT_PREVIEW_CHARS))
            } else {
                let lines = output.trim().split('\n').count();
                let noun = if lines == 1 { "line" } else { "lines" };
                format!("→ ({lines} {noun})")
            };
            Some(line.bright_black().to_string())
        }
        ToolResult::Error { content } => Some(
            format!("✗ {}", preview(content, ERROR_PREVIEW_CHARS))
                .magenta()
                .to_string(),
        ),
        ToolResult::Other { kind: Some(kind) } if options.verbose => {
            Some(format!("→ ({kind})").bright_black().to_string())
        }
        ToolResult::Other { .. } => None,
    }
}

fn render_run_result(summary: &RunSummary) -> String {
    let status = if summary.is_error {
        "✗ Failed".magenta()
    } else {
        "✓ Complete".green()
    };
    let mut line = format!("\n{status}");
    if let Some(cost) = summary.total_cost_usd.filter(|cost| *cost != 0.0) {
        line.push_str(&format!(" {}", format!("(${cost:.4})").dimmed()));
    }
    if let Some(ms) = summary.duration_ms.filter(|ms| *ms > 0.0) {
        let secs = ms / 1000.0;
        line.push_str(&format!(" {}", format!("({secs:.1}s)").dimmed()));
    }
    line
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
