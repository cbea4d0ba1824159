//! Failure reporting.
//!
//! Every failure in the lifecycle is reported exactly once, at the point where
//! it is detected, through a [`Reporter`]. Reporters return nothing and must
//! never panic on output errors: a failed report cannot be allowed to mask the
//! error being reported.

use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ReportMode};

/// Source location of a report, captured by [`site!`](crate::site).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Capture the current source location as a [`Site`].
#[macro_export]
macro_rules! site {
    () => {
        $crate::report::Site {
            file: file!(),
            line: line!(),
        }
    };
}

/// Report a failure at the current source location.
///
/// `report!(reporter, errno, "context", "message")` or
/// `report!(reporter, errno, "context")` when there is nothing to add beyond
/// the context.
#[macro_export]
macro_rules! report {
    ($reporter:expr, $errno:expr, $context:expr, $message:expr) => {
        $crate::report::Reporter::report(
            &$reporter,
            $errno,
            &$crate::site!(),
            $context,
            Some($message),
        )
    };
    ($reporter:expr, $errno:expr, $context:expr) => {
        $crate::report::Reporter::report(&$reporter, $errno, &$crate::site!(), $context, None)
    };
}

/// External collaborator receiving failure reports.
pub trait Reporter: Send + Sync {
    /// `errno` is the OS error code, or `0` when the failure is not
    /// OS-attributable. `context` names the operation that failed.
    fn report(&self, errno: i32, site: &Site, context: &str, message: Option<&str>);
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn report(&self, errno: i32, site: &Site, context: &str, message: Option<&str>) {
        (**self).report(errno, site, context, message);
    }
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, errno: i32, site: &Site, context: &str, message: Option<&str>) {
        (**self).report(errno, site, context, message);
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&self, errno: i32, site: &Site, context: &str, message: Option<&str>) {
        (**self).report(errno, site, context, message);
    }
}

/// OS description of an error code, `None` for `0`.
#[must_use]
pub fn describe_errno(errno: i32) -> Option<String> {
    if errno == 0 {
        return None;
    }
    Some(io::Error::from_raw_os_error(errno).to_string())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One failure report as a structured value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub timestamp_ms: u64,
    pub level: String,
    pub errno: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_error: Option<String>,
    pub location: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReportRecord {
    #[must_use]
    pub fn new(errno: i32, site: &Site, context: &str, message: Option<&str>) -> Self {
        Self {
            timestamp_ms: unix_millis(),
            level: "error".to_string(),
            errno,
            os_error: describe_errno(errno),
            location: site.to_string(),
            context: context.to_string(),
            message: message.map(str::to_string),
        }
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Reporters
// ---------------------------------------------------------------------------

/// Prints one line per failure to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrReporter;

impl StderrReporter {
    /// Render the line written for a report (no trailing newline).
    #[must_use]
    pub fn format_line(errno: i32, site: &Site, context: &str, message: Option<&str>) -> String {
        let mut line = format!("[threadwrap] {site} {context}");
        if let Some(message) = message {
            line.push_str(": ");
            line.push_str(message);
        }
        if let Some(desc) = describe_errno(errno) {
            let _ = write!(line, " ({desc})");
        }
        line
    }
}

impl Reporter for StderrReporter {
    fn report(&self, errno: i32, site: &Site, context: &str, message: Option<&str>) {
        let line = Self::format_line(errno, site, context, message);
        let _ = writeln!(io::stderr().lock(), "{line}");
    }
}

/// Writes one JSON object per failure to a shared sink.
pub struct JsonlReporter<W: Write + Send> {
    sink: Mutex<W>,
}

impl<W: Write + Send> JsonlReporter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }
}

impl<W: Write + Send> fmt::Debug for JsonlReporter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonlReporter").finish_non_exhaustive()
    }
}

impl<W: Write + Send> Reporter for JsonlReporter<W> {
    fn report(&self, errno: i32, site: &Site, context: &str, message: Option<&str>) {
        let record = ReportRecord::new(errno, site, context, message);
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        let mut sink = self.sink.lock();
        let _ = writeln!(sink, "{line}");
        let _ = sink.flush();
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    records: Mutex<Vec<ReportRecord>>,
}

impl MemoryReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<ReportRecord> {
        self.records.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<ReportRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, errno: i32, site: &Site, context: &str, message: Option<&str>) {
        self.records
            .lock()
            .push(ReportRecord::new(errno, site, context, message));
    }
}

/// Drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn report(&self, _errno: i32, _site: &Site, _context: &str, _message: Option<&str>) {}
}

/// Reporter selected by [`Config`].
pub enum ConfiguredReporter {
    Stderr(StderrReporter),
    Jsonl(JsonlReporter<Box<dyn Write + Send>>),
    Silent(SilentReporter),
}

impl ConfiguredReporter {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        match config.report {
            ReportMode::Stderr => Self::Stderr(StderrReporter),
            ReportMode::Silent => Self::Silent(SilentReporter),
            ReportMode::Jsonl => {
                let file = config.report_path.as_ref().and_then(|path| {
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .ok()
                });
                let sink: Box<dyn Write + Send> = match file {
                    Some(file) => Box::new(file),
                    None => Box::new(io::stderr()),
                };
                Self::Jsonl(JsonlReporter::new(sink))
            }
        }
    }

    #[must_use]
    pub fn mode(&self) -> ReportMode {
        match self {
            Self::Stderr(_) => ReportMode::Stderr,
            Self::Jsonl(_) => ReportMode::Jsonl,
            Self::Silent(_) => ReportMode::Silent,
        }
    }
}

impl fmt::Debug for ConfiguredReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfiguredReporter")
            .field(&self.mode())
            .finish()
    }
}

impl Reporter for ConfiguredReporter {
    fn report(&self, errno: i32, site: &Site, context: &str, message: Option<&str>) {
        match self {
            Self::Stderr(r) => r.report(errno, site, context, message),
            Self::Jsonl(r) => r.report(errno, site, context, message),
            Self::Silent(r) => r.report(errno, site, context, message),
        }
    }
}
