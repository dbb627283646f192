// SPDX-License-Identifier: Apache-2.0 OR MIT
// Output sinks for rendered log lines

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Destination for rendered log lines
///
/// Only the drain side writes to a sink, always from one thread at a time.
pub trait LogSink: Send {
    /// Write one line; the sink appends the line terminator
    fn write_line(&mut self, line: &str);

    /// Flush any buffered output
    fn flush(&mut self);

    /// Backing file, if the sink has one
    fn location(&self) -> Option<&Path> {
        None
    }

    /// Show the sink's output to the user (e.g. open its folder)
    fn reveal_to_user(&self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn write_line(&mut self, line: &str) {
        (**self).write_line(line)
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn location(&self) -> Option<&Path> {
        (**self).location()
    }

    fn reveal_to_user(&self) -> io::Result<()> {
        (**self).reveal_to_user()
    }
}

/// Standard output sink (writes to stdout)
pub struct StdoutSink {
    stdout: io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for StdoutSink {
    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self.stdout, "{}", line);
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

/// Standard error sink (writes to stderr)
pub struct StderrSink {
    stderr: io::Stderr,
}

impl StderrSink {
    pub fn new() -> Self {
        Self {
            stderr: io::stderr(),
        }
    }
}

impl Default for StderrSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for StderrSink {
    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self.stderr, "{}", line);
    }

    fn flush(&mut self) {
        let _ = self.stderr.flush();
    }
}

/// Buffered append-only log file
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Open (or create) `path` for appending, creating parent directories
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Create `<dir>/<app>/<prefix>_<YYYY-MM-DD_HH-MM-SS>.<ext>`
    pub fn date_stamped(
        dir: impl AsRef<Path>,
        app: &str,
        prefix: &str,
        extension: &str,
    ) -> io::Result<Self> {
        let name = date_stamped_file_name(prefix, extension, Local::now());
        Self::create(dir.as_ref().join(app).join(name))
    }

    /// Write `"Welcome to <app> <version> spawned at <RFC3339>"`
    pub fn write_welcome(&mut self, app: &str, version: &str) {
        let line = welcome_line(app, version, Local::now());
        self.write_line(&line);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self.writer, "{}", line);
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn reveal_to_user(&self) -> io::Result<()> {
        reveal_in_file_browser(&self.path)
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

fn date_stamped_file_name(prefix: &str, extension: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        prefix,
        at.format("%Y-%m-%d_%H-%M-%S"),
        extension.trim_start_matches('.')
    )
}

pub(crate) fn welcome_line(app: &str, version: &str, at: DateTime<Local>) -> String {
    format!("Welcome to {} {} spawned at {}", app, version, at.to_rfc3339())
}

/// Open the platform file browser on `path`
fn reveal_in_file_browser(path: &Path) -> io::Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg("-R").arg(path);
        c
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("explorer");
        c.arg(format!("/select,{}", path.display()));
        c
    } else {
        // xdg-open cannot select a file, so show the containing folder
        let mut c = Command::new("xdg-open");
        c.arg(path.parent().unwrap_or(path));
        c
    };
    command.spawn().map(|_| ())
}

/// Wraps a sink and copies every line to stdout
pub struct ConsoleMirror<S> {
    inner: S,
    stdout: io::Stdout,
}

impl<S: LogSink> ConsoleMirror<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stdout: io::stdout(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: LogSink> LogSink for ConsoleMirror<S> {
    fn write_line(&mut self, line: &str) {
        self.inner.write_line(line);
        let _ = writeln!(self.stdout, "{}", line);
    }

    fn flush(&mut self) {
        self.inner.flush();
        let _ = self.stdout.flush();
    }

    fn location(&self) -> Option<&Path> {
        self.inner.location()
    }

    fn reveal_to_user(&self) -> io::Result<()> {
        self.inner.reveal_to_user()
    }
}

/// In-memory sink; clones share the same buffer
///
/// Handy for tests and for hosts that render the log themselves.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn write_line(&mut self, line: &str) {
        self.lines.lock().push(line.to_string());
    }

    fn flush(&mut self) {}
}
