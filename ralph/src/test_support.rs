//! Test helpers: a scripted executor, a fake agent binary, and spec fixtures.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::executor::{
    Executor, IterationError, IterationOutcome, IterationRequest, StreamState,
};
use crate::io::session_log::SessionLog;

/// One scripted agent iteration.
#[derive(Debug, Clone)]
pub enum ScriptedIteration {
    /// A successful run whose only assistant text is the given string.
    Text(String),
    /// Raw stdout and stderr lines, then exit 0.
    Lines { stdout: Vec<String>, stderr: Vec<String> },
    /// Some output, then a non-zero exit.
    Fail(i32),
    /// The agent binary cannot be launched.
    SpawnError,
}

/// Executor that replays [`ScriptedIteration`]s through the real stream handling.
///
/// Running past the end of the script is an iteration error.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: RefCell<VecDeque<ScriptedIteration>>,
    calls: Cell<u32>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<ScriptedIteration>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Executor for ScriptedExecutor {
    fn run_iteration(
        &self,
        request: &IterationRequest,
        log: &SessionLog,
    ) -> Result<IterationOutcome, IterationError> {
        self.calls.set(self.calls.get() + 1);
        self.prompts.borrow_mut().push(request.prompt.clone());
        let step = self
            .script
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| IterationError::Stream(anyhow!("script exhausted")))?;

        let mut state = StreamState::new(log.clone(), request.render);
        match step {
            ScriptedIteration::Text(text) => {
                for line in text_run(&text) {
                    state.handle_stdout(&line);
                }
                Ok(state.finish(Some(0)))
            }
            ScriptedIteration::Lines { stdout, stderr } => {
                for line in &stderr {
                    log.stderr_line(line);
                }
                for line in &stdout {
                    state.handle_stdout(line);
                }
                Ok(state.finish(Some(0)))
            }
            ScriptedIteration::Fail(code) => {
                state.handle_stdout(&assistant_line("Something went wrong."));
                Err(IterationError::Failed { code: Some(code) })
            }
            ScriptedIteration::SpawnError => Err(IterationError::Spawn {
                program: "scripted-agent".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
        }
    }
}

/// Stream-json line for an assistant message with one text block.
pub fn assistant_line(text: &str) -> String {
    serde_json::json!({
        "type": "assistant",
        "message": {"content": [{"type": "text", "text": text}]}
    })
    .to_string()
}

/// A complete successful run: init, one assistant text block, result.
pub fn text_run(text: &str) -> Vec<String> {
    vec![
        r#"{"type":"system","subtype":"init","model":"claude-test"}"#.to_string(),
        assistant_line(text),
        r#"{"type":"result","subtype":"success","is_error":false,"total_cost_usd":0.0123,"duration_ms":2000}"#
            .to_string(),
    ]
}

/// Project root with a `specs/backlog` tree, kept alive for the test's duration.
#[derive(Debug)]
pub struct SpecFixture {
    _temp: TempDir,
    root: PathBuf,
}

impl SpecFixture {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = fs::canonicalize(temp.path()).context("canonicalize tempdir")?;
        let root = root.join("project");
        fs::create_dir_all(root.join("specs/backlog")).context("create backlog")?;
        Ok(Self { _temp: temp, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add `specs/backlog/<name>/PRD.md`, plus a plan when `with_plan`.
    pub fn add_spec(&self, name: &str, with_plan: bool) -> Result<PathBuf> {
        let folder = self.root.join("specs/backlog").join(name);
        fs::create_dir_all(&folder).with_context(|| format!("create {}", folder.display()))?;
        fs::write(folder.join("PRD.md"), format!("# {name}\n")).context("write PRD")?;
        if with_plan {
            fs::write(folder.join("IMPLEMENTATION_PLAN.md"), "- [ ] first task\n")
                .context("write plan")?;
        }
        Ok(folder)
    }
}

/// Shell script standing in for the agent binary.
///
/// Invocation `n` records its arguments (NUL-separated) and working directory,
/// prints `iter-<n>.out` to stdout and `iter-<n>.err` to stderr, then exits
/// with the code in `iter-<n>.code` (default 0).
#[cfg(unix)]
#[derive(Debug)]
pub struct FakeAgent {
    _temp: TempDir,
    dir: PathBuf,
    program: PathBuf,
}

#[cfg(unix)]
impl FakeAgent {
    pub fn new() -> Result<Self> {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().context("create tempdir")?;
        let dir = fs::canonicalize(temp.path()).context("canonicalize tempdir")?;
        let program = dir.join("fake-claude");
        let script = format!(
            r#"#!/bin/sh
dir='{dir}'
n=$(cat "$dir/count" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "$dir/count"
: > "$dir/args-$n"
for arg in "$@"; do printf '%s\0' "$arg" >> "$dir/args-$n"; done
pwd > "$dir/cwd-$n"
if [ -f "$dir/iter-$n.out" ]; then cat "$dir/iter-$n.out"; fi
if [ -f "$dir/iter-$n.err" ]; then cat "$dir/iter-$n.err" >&2; fi
code=0
if [ -f "$dir/iter-$n.code" ]; then code=$(cat "$dir/iter-$n.code"); fi
exit "$code"
"#,
            dir = dir.display()
        );
        fs::write(&program, script).context("write fake agent")?;
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755))
            .context("chmod fake agent")?;
        Ok(Self {
            _temp: temp,
            dir,
            program,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Script invocation `n` (1-based).
    pub fn script(&self, n: u32, stdout: &[String], stderr: &[&str], code: i32) -> Result<()> {
        let mut out = stdout.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        fs::write(self.dir.join(format!("iter-{n}.out")), out).context("write stdout script")?;
        if !stderr.is_empty() {
            let err = format!("{}\n", stderr.join("\n"));
            fs::write(self.dir.join(format!("iter-{n}.err")), err)
                .context("write stderr script")?;
        }
        fs::write(self.dir.join(format!("iter-{n}.code")), code.to_string())
            .context("write exit code")?;
        Ok(())
    }

    /// Number of times the agent has been invoked.
    pub fn calls(&self) -> Result<u32> {
        let path = self.dir.join("count");
        if !path.exists() {
            return Ok(0);
        }
        let raw = fs::read_to_string(&path).context("read call count")?;
        raw.trim().parse().context("parse call count")
    }

    /// Arguments of invocation `n`.
    pub fn args(&self, n: u32) -> Result<Vec<String>> {
        let raw = fs::read(self.dir.join(format!("args-{n}"))).context("read args")?;
        Ok(raw
            .split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect())
    }

    /// Working directory of invocation `n`.
    pub fn cwd(&self, n: u32) -> Result<PathBuf> {
        let raw = fs::read_to_string(self.dir.join(format!("cwd-{n}"))).context("read cwd")?;
        Ok(PathBuf::from(raw.trim_end()))
    }
}
