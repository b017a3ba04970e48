//! Decoder for the agent's line-delimited JSON event stream.
//!
//! Each stdout line from the agent is either a single JSON object describing an
//! [`Event`] or free-form diagnostic text. [`decode_line`] is total: anything it
//! cannot interpret comes back as [`Decoded::Opaque`] carrying the original line.

use serde::Deserialize;
use serde_json::Value;

/// One decoded protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Session bootstrap; names the model serving the session.
    SystemInit { model: String },
    /// Any other `system` line (hooks, compaction boundaries, ...).
    System { subtype: Option<String> },
    /// Assistant turn: free text and tool invocations, in emission order.
    AssistantMessage { blocks: Vec<ContentBlock> },
    /// Result of a tool invocation fed back to the agent.
    ToolResult(ToolResult),
    /// Final summary of the agent run.
    RunResult(RunSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    ToolUse { name: String, input: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    FileRead {
        path: String,
        num_lines: u64,
        content: String,
    },
    CommandOutput {
        stdout: String,
        stderr: String,
    },
    Error {
        content: String,
    },
    /// Unclassified payload; `kind` is its `type` tag when it has one.
    Other {
        kind: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub is_error: bool,
    pub total_cost_usd: Option<f64>,
    pub duration_ms: Option<f64>,
}

/// Outcome of decoding one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(Event),
    /// Not a protocol line; holds the input unchanged.
    Opaque(String),
}

impl Event {
    /// Free-text blocks of an assistant message, in order. Empty for other kinds.
    pub fn assistant_text(&self) -> impl Iterator<Item = &str> {
        let blocks: &[ContentBlock] = match self {
            Event::AssistantMessage { blocks } => blocks,
            _ => &[],
        };
        blocks.iter().filter_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            ContentBlock::ToolUse { .. } => None,
        })
    }
}

/// Decode one line of agent output. Never fails.
pub fn decode_line(line: &str) -> Decoded {
    match serde_json::from_str::<RawEvent>(line) {
        Ok(raw) => Decoded::Event(raw.into_event()),
        Err(_) => Decoded::Opaque(line.to_string()),
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Assistant {
        message: RawAssistantMessage,
    },
    User {
        #[serde(default)]
        message: Option<RawUserMessage>,
        #[serde(default)]
        tool_use_result: Option<Value>,
    },
    Result {
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        duration_ms: Option<f64>,
    },
}

/// Blocks stay untyped so one malformed block cannot hide its siblings.
#[derive(Deserialize)]
struct RawAssistantMessage {
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
struct RawUserMessage {
    #[serde(default)]
    content: Value,
}

impl RawEvent {
    fn into_event(self) -> Event {
        match self {
            RawEvent::System { subtype, model } if subtype.as_deref() == Some("init") => {
                Event::SystemInit {
                    model: model.unwrap_or_else(|| "unknown".to_string()),
                }
            }
            RawEvent::System { subtype, .. } => Event::System { subtype },
            RawEvent::Assistant { message } => Event::AssistantMessage {
                blocks: match message.content {
                    Value::Array(blocks) => blocks.iter().filter_map(decode_block).collect(),
                    _ => Vec::new(),
                },
            },
            RawEvent::User {
                message,
                tool_use_result,
            } => Event::ToolResult(classify_tool_result(
                tool_use_result.as_ref(),
                message.as_ref(),
            )),
            RawEvent::Result {
                is_error,
                total_cost_usd,
                duration_ms,
            } => Event::RunResult(RunSummary {
                is_error,
                total_cost_usd,
                duration_ms,
            }),
        }
    }
}

/// Text and tool-use blocks; anything else (thinking, images, junk) is dropped.
fn decode_block(block: &Value) -> Option<ContentBlock> {
    match block.get("type").and_then(Value::as_str)? {
        "text" => block
            .get("text")
            .and_then(Value::as_str)
            .map(|text| ContentBlock::Text(text.to_string())),
        "tool_use" => Some(ContentBlock::ToolUse {
            name: block
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            input: block.get("input").cloned().unwrap_or(Value::Null),
        }),
        _ => None,
    }
}

/// Classify a tool result: file read, then command output, then error, then other.
fn classify_tool_result(result: Option<&Value>, message: Option<&RawUserMessage>) -> ToolResult {
    if let Some(file) = result.and_then(|r| r.get("file")).filter(|f| f.is_object()) {
        return ToolResult::FileRead {
            path: str_field(file, "filePath"),
            num_lines: file.get("numLines").and_then(Value::as_u64).unwrap_or(0),
            content: str_field(file, "content"),
        };
    }
    if let Some(result) = result.filter(|r| r.get("stdout").is_some()) {
        return ToolResult::CommandOutput {
            stdout: str_field(result, "stdout"),
            stderr: str_field(result, "stderr"),
        };
    }
    if let Some(content) = message.and_then(error_content) {
        return ToolResult::Error { content };
    }
    ToolResult::Other {
        kind: result
            .and_then(|r| r.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Content of the first message block when it is flagged `is_error`.
fn error_content(message: &RawUserMessage) -> Option<String> {
    let first = message.content.as_array()?.first()?;
    if !first.get("is_error").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let content = match first.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };
    Some(content)
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
