//! Scenario harness for threadwrap.
//!
//! This crate provides:
//! - Scenarios: the counter check, a many-thread fan-out, and a
//!   fault-injection matrix over every lifecycle step
//! - Structured logging: one JSONL record per scenario run

#![forbid(unsafe_code)]

pub mod scenarios;
pub mod structured_log;

pub use scenarios::{
    Expected, FaultCase, FaultOutcome, Observed, ScenarioError, default_fault_matrix,
    run_counter, run_fanout, run_fault_case,
};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
