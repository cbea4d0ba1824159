//! Integration tests: harness CLI
//!
//! Validates:
//! 1. Every subcommand exits zero on a healthy host and logs a passing run.
//! 2. `--log` writes a schema-valid JSONL file; stdout is used otherwise.
//! 3. The fault matrix logs one record per case with errno for failures.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use threadwrap_harness::structured_log::{LogEntry, Outcome, validate_log_file, validate_log_line};

fn unique_tmp_log(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after UNIX_EPOCH")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{}-{nanos}.jsonl", std::process::id()))
}

fn harness(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_harness"))
        .args(args)
        .env("THREADWRAP_REPORT", "silent")
        .env_remove("THREADWRAP_TEARDOWN")
        .output()
        .expect("harness should execute")
}

fn entries(text: &str) -> Vec<LogEntry> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, l)| {
            validate_log_line(l, i + 1).unwrap_or_else(|errs| {
                panic!(
                    "invalid log line {}: {}",
                    i + 1,
                    errs.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
                )
            })
        })
        .collect()
}

#[test]
fn counter_logs_to_stdout_and_passes() {
    let output = harness(&["counter"]);
    assert!(output.status.success(), "counter should pass");

    let log = entries(&String::from_utf8_lossy(&output.stdout));
    let events: Vec<&str> = log.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(events, vec!["run_start", "scenario", "run_end"]);
    assert_eq!(log[0].teardown.as_deref(), Some("keep"));
    assert_eq!(log[1].scenario.as_deref(), Some("counter"));
    assert_eq!(log[1].outcome, Some(Outcome::Pass));
    assert!(log[1].latency_ns.is_some_and(|ns| ns > 0));
    assert_eq!(log[2].outcome, Some(Outcome::Pass));
}

#[test]
fn fanout_writes_log_file() {
    let path = unique_tmp_log("threadwrap-fanout");
    let output = harness(&["--log", path.to_str().unwrap(), "fanout", "--threads", "64"]);
    assert!(output.status.success(), "fanout should pass");
    assert!(output.stdout.is_empty(), "log goes to the file, not stdout");

    let (lines, errors) = validate_log_file(&path).expect("read log");
    assert_eq!(lines, 3);
    assert!(errors.is_empty(), "{errors:?}");

    let log = entries(&std::fs::read_to_string(&path).unwrap());
    assert_eq!(log[1].scenario.as_deref(), Some("fanout"));
    assert_eq!(log[1].threads, Some(64));
    assert_eq!(log[1].outcome, Some(Outcome::Pass));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn fanout_defaults_to_one_hundred_threads() {
    let output = harness(&["fanout"]);
    assert!(output.status.success());
    let log = entries(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(log[1].threads, Some(100));
}

#[test]
fn fault_matrix_passes_and_records_each_case() {
    let output = harness(&["faults"]);
    assert!(
        output.status.success(),
        "faults should pass: {}",
        String::from_utf8_lossy(&output.stdout)
    );

    let log = entries(&String::from_utf8_lossy(&output.stdout));
    let cases: Vec<&LogEntry> = log.iter().filter(|e| e.event == "scenario").collect();
    assert_eq!(cases.len(), threadwrap_harness::default_fault_matrix().len());
    assert!(cases.iter().all(|e| e.outcome == Some(Outcome::Pass)));

    let start = cases
        .iter()
        .find(|e| e.scenario.as_deref() == Some("faults/start/keep"))
        .expect("start case logged");
    assert_eq!(start.errno, Some(libc::EAGAIN));
    assert_eq!(start.error_kind.as_deref(), Some("thread_start_failure"));

    let strict = cases
        .iter()
        .find(|e| e.scenario.as_deref() == Some("faults/attr_destroy/strict"))
        .expect("strict teardown case logged");
    assert_eq!(strict.teardown.as_deref(), Some("strict"));
    assert_eq!(strict.error_kind.as_deref(), Some("attribute_teardown_failure"));

    let keep = cases
        .iter()
        .find(|e| e.scenario.as_deref() == Some("faults/attr_destroy/keep"))
        .expect("keep teardown case logged");
    assert_eq!(keep.errno, None);
}

#[test]
fn unknown_subcommand_is_rejected() {
    let output = harness(&["detach"]);
    assert!(!output.status.success());
}
