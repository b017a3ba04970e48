//! Per-invocation product logs: a plain-text transcript and a raw event journal.
//!
//! Both files live under `<spec folder>/logs/` and share the loop's start
//! timestamp as their stem. Console output goes through the same handle so the
//! transcript mirrors what the operator saw, minus color codes.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::core::ansi::strip_ansi;

/// Subdirectory of the spec folder holding session logs.
pub const LOGS_DIR: &str = "logs";

/// Open transcript + journal pair for one loop invocation.
#[derive(Debug)]
pub struct LogSession {
    transcript: BufWriter<File>,
    journal: BufWriter<File>,
    transcript_path: PathBuf,
    journal_path: PathBuf,
    closed: bool,
}

impl LogSession {
    /// Open a session under `folder/logs`, writing the transcript header.
    ///
    /// Returns `Ok(None)` when `folder` does not exist: logging is optional
    /// without a spec context.
    pub fn open(folder: &Path, label: &str) -> Result<Option<Self>> {
        if !folder.is_dir() {
            debug!(folder = %folder.display(), "spec folder missing; session logging disabled");
            return Ok(None);
        }
        let logs_dir = folder.join(LOGS_DIR);
        fs::create_dir_all(&logs_dir)
            .with_context(|| format!("create logs dir {}", logs_dir.display()))?;

        let now = Utc::now();
        let stem = now.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
        let transcript_path = logs_dir.join(format!("{stem}.log"));
        let journal_path = logs_dir.join(format!("{stem}.jsonl"));

        let mut session = Self {
            transcript: BufWriter::new(open_append(&transcript_path)?),
            journal: BufWriter::new(open_append(&journal_path)?),
            transcript_path,
            journal_path,
            closed: false,
        };
        let header = format!(
            "Ralph Loop Log\n==============\nSpec: {label}\nPath: {}\nStarted: {}\n\n",
            folder.display(),
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        session
            .write_transcript(&header)
            .with_context(|| format!("write header {}", session.transcript_path.display()))?;
        debug!(transcript = %session.transcript_path.display(), "opened log session");
        Ok(Some(session))
    }

    pub fn transcript_path(&self) -> &Path {
        &self.transcript_path
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    fn write_transcript(&mut self, text: &str) -> std::io::Result<()> {
        self.transcript.write_all(text.as_bytes())?;
        self.transcript.flush()
    }

    fn write_journal(&mut self, line: &str) -> std::io::Result<()> {
        self.journal.write_all(line.as_bytes())?;
        self.journal.write_all(b"\n")?;
        self.journal.flush()
    }

    /// Append the end timestamp and flush both sinks. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let footer = format!(
            "\nEnded: {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        self.write_transcript(&footer)
            .with_context(|| format!("write footer {}", self.transcript_path.display()))?;
        self.journal
            .flush()
            .with_context(|| format!("flush journal {}", self.journal_path.display()))?;
        debug!(transcript = %self.transcript_path.display(), "closed log session");
        Ok(())
    }
}

impl Drop for LogSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(err = %format!("{err:#}"), "failed to close log session");
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

/// Shared handle to an optional [`LogSession`], plus console output.
///
/// Clones share one session behind a single lock, so the stdout and stderr
/// readers of an iteration can write concurrently. Sink failures after open are
/// reported through `tracing` and never abort the loop.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    inner: Arc<Mutex<Option<LogSession>>>,
}

impl SessionLog {
    /// Console-only handle; nothing is persisted.
    pub fn console() -> Self {
        Self::default()
    }

    /// Handle backed by a session under `folder`, or console-only when the
    /// folder is missing.
    pub fn open(folder: &Path, label: &str) -> Result<Self> {
        let session = LogSession::open(folder, label)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(session)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<LogSession>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transcript_path(&self) -> Option<PathBuf> {
        self.lock()
            .as_ref()
            .map(|session| session.transcript_path.clone())
    }

    pub fn journal_path(&self) -> Option<PathBuf> {
        self.lock()
            .as_ref()
            .map(|session| session.journal_path.clone())
    }

    /// Print `text` to stdout and append it, color codes stripped, to the transcript.
    pub fn line(&self, text: &str) {
        let mut guard = self.lock();
        println!("{text}");
        if let Some(session) = guard.as_mut() {
            let plain = strip_ansi(text);
            if let Err(err) = session.write_transcript(&format!("{plain}\n")) {
                warn!(err = %err, "failed to write transcript");
            }
        }
    }

    /// Append one undecoded protocol line to the journal.
    pub fn raw(&self, line: &str) {
        if let Some(session) = self.lock().as_mut()
            && let Err(err) = session.write_journal(line)
        {
            warn!(err = %err, "failed to write journal");
        }
    }

    /// Forward one subprocess stderr line to our stderr and the transcript.
    pub fn stderr_line(&self, line: &str) {
        let mut guard = self.lock();
        eprintln!("{line}");
        if let Some(session) = guard.as_mut()
            && let Err(err) = session.write_transcript(&format!("{line}\n"))
        {
            warn!(err = %err, "failed to write transcript");
        }
    }

    /// Report a failure on stderr and in the transcript, color codes stripped
    /// from the transcript copy only.
    pub fn error(&self, text: &str) {
        let mut guard = self.lock();
        eprintln!("{text}");
        if let Some(session) = guard.as_mut() {
            let plain = strip_ansi(text);
            if let Err(err) = session.write_transcript(&format!("{plain}\n")) {
                warn!(err = %err, "failed to write transcript");
            }
        }
    }

    /// Close the session, if any. Subsequent writes only reach the console.
    pub fn close(&self) -> Result<()> {
        let session = self.lock().take();
        match session {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }
}
