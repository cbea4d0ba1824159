//! CLI entrypoint for the threadwrap scenario harness.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use threadwrap_core::{Config, Lifecycle};
use threadwrap_harness::scenarios::{self, ScenarioError, teardown_name};
use threadwrap_harness::structured_log::{self, LogEmitter, LogEntry, LogLevel, Outcome};

/// Scenario harness for threadwrap.
#[derive(Debug, Parser)]
#[command(name = "threadwrap-harness")]
#[command(about = "Runs threadwrap lifecycle scenarios and writes a JSONL run log")]
struct Cli {
    /// Write the JSONL run log here instead of stdout.
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Spawn one thread that increments a counter, join it, check the count.
    Counter,
    /// Spawn many threads with distinct arguments and join them all.
    Fanout {
        /// Number of threads to spawn.
        #[arg(long, default_value_t = 100)]
        threads: usize,
    },
    /// Fail each lifecycle step in turn and check the documented outcome.
    Faults,
}

fn scenario_entry(scenario: &str, started: Instant, failure: Option<&ScenarioError>) -> LogEntry {
    let entry = LogEntry::new("", LogLevel::Info, "scenario")
        .with_scenario(scenario)
        .with_latency_ns(started.elapsed().as_nanos() as u64);
    let Some(err) = failure else {
        return entry.with_outcome(Outcome::Pass);
    };
    let entry = entry
        .with_outcome(Outcome::Fail)
        .with_details(serde_json::json!({ "error": err.to_string() }));
    match err.thread_error() {
        Some(thread_err) => entry.with_error(thread_err.errno(), thread_err.kind().as_str()),
        None => entry,
    }
}

fn run(command: Command, emitter: &mut LogEmitter) -> std::io::Result<bool> {
    let config = Config::from_env();
    let lifecycle = Lifecycle::from_config(&config);
    emitter.emit_entry(
        LogEntry::new("", LogLevel::Info, "run_start")
            .with_teardown(teardown_name(config.teardown))
            .with_details(serde_json::json!({ "report": format!("{:?}", config.report) })),
    )?;

    let mut passed = true;
    match command {
        Command::Counter => {
            let started = Instant::now();
            let result = scenarios::run_counter(&lifecycle);
            passed &= result.is_ok();
            emitter.emit_entry(
                scenario_entry("counter", started, result.as_ref().err()).with_threads(1),
            )?;
        }
        Command::Fanout { threads } => {
            let started = Instant::now();
            let result = scenarios::run_fanout(&lifecycle, threads);
            passed &= result.is_ok();
            emitter.emit_entry(
                scenario_entry("fanout", started, result.as_ref().err()).with_threads(threads),
            )?;
        }
        Command::Faults => {
            for case in scenarios::default_fault_matrix() {
                let started = Instant::now();
                let outcome = scenarios::run_fault_case(&case);
                let mut entry = scenario_entry(
                    &format!("faults/{}", case.name()),
                    started,
                    outcome.as_ref().err(),
                )
                .with_teardown(teardown_name(case.teardown));
                match &outcome {
                    Ok(outcome) => {
                        if let Some(err) = outcome.observed.error() {
                            entry = entry.with_error(err.errno(), err.kind().as_str());
                        }
                        entry = entry.with_details(serde_json::json!({
                            "expected": case.expected.to_string(),
                            "observed": outcome.observed.to_string(),
                            "reports": outcome.reports,
                        }));
                    }
                    Err(_) => passed = false,
                }
                emitter.emit_entry(entry)?;
            }
        }
    }

    emitter.emit_entry(
        LogEntry::new("", LogLevel::Info, "run_end").with_outcome(if passed {
            Outcome::Pass
        } else {
            Outcome::Fail
        }),
    )?;
    emitter.flush()?;
    Ok(passed)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let run_id = structured_log::default_run_id();

    let mut emitter = match &cli.log {
        Some(path) => match LogEmitter::to_file(path, &run_id) {
            Ok(emitter) => emitter,
            Err(err) => {
                eprintln!("cannot open log {}: {err}", path.display());
                return ExitCode::from(2);
            }
        },
        None => LogEmitter::to_stdout(&run_id),
    };

    match run(cli.command, &mut emitter) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("threadwrap-harness: scenario failures, see run log");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("threadwrap-harness: cannot write run log: {err}");
            ExitCode::from(2)
        }
    }
}
