//! Runtime configuration.
//!
//! Read from the environment:
//! - `THREADWRAP_REPORT`: where failure reports go. `stderr` (default) prints a
//!   formatted line, `jsonl` writes structured records, `silent` drops them.
//! - `THREADWRAP_REPORT_PATH`: file the `jsonl` reporter appends to. Falls back
//!   to stderr when unset or when the file cannot be opened.
//! - `THREADWRAP_TEARDOWN`: what spawn does when the attribute cannot be
//!   destroyed after the thread already started. `keep` (default) reports and
//!   hands the live thread back; `strict` fails the spawn.

use std::path::PathBuf;

pub const ENV_REPORT: &str = "THREADWRAP_REPORT";
pub const ENV_REPORT_PATH: &str = "THREADWRAP_REPORT_PATH";
pub const ENV_TEARDOWN: &str = "THREADWRAP_TEARDOWN";

/// Destination of failure reports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportMode {
    /// One human-readable line per failure on stderr.
    #[default]
    Stderr,
    /// One JSON object per failure.
    Jsonl,
    /// Reports are discarded. Errors are still returned.
    Silent,
}

impl ReportMode {
    /// Parse from string (case-insensitive). Unknown values select the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" | "json" | "structured" => Self::Jsonl,
            "silent" | "off" | "none" | "quiet" => Self::Silent,
            _ => Self::Stderr,
        }
    }
}

/// Behaviour when attribute teardown fails after a successful thread start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownPolicy {
    /// Report the teardown failure and still return the handle, so the running
    /// thread stays joinable.
    #[default]
    KeepHandle,
    /// Release the handle and fail with `AttributeTeardownFailure`. The started
    /// thread keeps running with nothing left to join it.
    Strict,
}

impl TeardownPolicy {
    /// Parse from string (case-insensitive). Unknown values select the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "legacy" | "fail" => Self::Strict,
            _ => Self::KeepHandle,
        }
    }
}

/// Resolved configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub report: ReportMode,
    pub report_path: Option<PathBuf>,
    pub teardown: TeardownPolicy,
}

impl Config {
    /// Read the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let report = lookup(ENV_REPORT)
            .map(|v| ReportMode::from_str_loose(&v))
            .unwrap_or_default();
        let report_path = lookup(ENV_REPORT_PATH)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let teardown = lookup(ENV_TEARDOWN)
            .map(|v| TeardownPolicy::from_str_loose(&v))
            .unwrap_or_default();
        Self {
            report,
            report_path,
            teardown,
        }
    }

    #[must_use]
    pub fn with_report(mut self, report: ReportMode) -> Self {
        self.report = report;
        self
    }

    #[must_use]
    pub fn with_teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }
}
