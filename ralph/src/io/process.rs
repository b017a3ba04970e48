//! Helpers for running a child process while streaming its output line by line.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, ScopedJoinHandle};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument};

/// Spawn `cmd` with the parent's stdin and piped stdout/stderr.
///
/// Launch failures come back as the raw `io::Error` so callers can tell a
/// missing or non-executable binary apart from failures after start.
pub fn spawn_piped(mut cmd: Command) -> std::io::Result<Child> {
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!(program = ?cmd.get_program(), "spawning child process");
    cmd.spawn().inspect_err(|err| {
        error!(err = %err, program = ?cmd.get_program(), "failed to spawn command");
    })
}

/// Drain stdout and stderr of `child` concurrently, one reader thread each,
/// then wait for it to exit.
///
/// Each handler sees its stream's lines in order, without the trailing line
/// break. No ordering holds between the two streams.
#[instrument(skip_all, fields(pid = child.id()))]
pub fn drain_lines<O, E>(mut child: Child, on_stdout: O, on_stderr: E) -> Result<ExitStatus>
where
    O: FnMut(&str) + Send,
    E: FnMut(&str) + Send,
{
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (stdout_result, stderr_result) = thread::scope(|scope| {
        let stdout_handle = scope.spawn(move || read_lines(stdout, on_stdout));
        let stderr_handle = scope.spawn(move || read_lines(stderr, on_stderr));
        (join_reader(stdout_handle), join_reader(stderr_handle))
    });

    let status = child.wait().context("wait for child process")?;
    let stdout_lines = stdout_result.context("read stdout")?;
    let stderr_lines = stderr_result.context("read stderr")?;
    debug!(
        exit_code = ?status.code(),
        stdout_lines,
        stderr_lines,
        "child process finished"
    );
    Ok(status)
}

fn join_reader(handle: ScopedJoinHandle<'_, Result<usize>>) -> Result<usize> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Feed every line of `reader` to `on_line`; returns the number of lines seen.
///
/// Invalid UTF-8 is replaced rather than rejected, and `\r\n` counts as one break.
fn read_lines<R: Read>(reader: R, mut on_line: impl FnMut(&str)) -> Result<usize> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0usize;
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).context("read line")?;
        if n == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.strip_suffix('\n').unwrap_or(&text);
        let line = line.strip_suffix('\r').unwrap_or(line);
        on_line(line);
        count += 1;
    }
    Ok(count)
}
