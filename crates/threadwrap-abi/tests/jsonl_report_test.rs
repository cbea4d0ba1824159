#![cfg(unix)]

// Runs alone in its own test binary: the process-wide lifecycle reads the
// environment once, on first use.

use std::io::BufRead;

use threadwrap_abi::destroy_thread;

#[test]
fn failures_are_written_as_jsonl_records() {
    let path = std::env::temp_dir().join(format!("threadwrap-abi-{}.jsonl", std::process::id()));
    let _ = std::fs::remove_file(&path);
    // SAFETY: no other thread in this test binary touches the environment.
    unsafe {
        std::env::set_var("THREADWRAP_REPORT", "jsonl");
        std::env::set_var("THREADWRAP_REPORT_PATH", &path);
    }

    assert_eq!(unsafe { destroy_thread(std::ptr::null_mut()) }, 1);

    let file = std::fs::File::open(&path).expect("report file");
    let lines: Vec<String> = std::io::BufReader::new(file)
        .lines()
        .map(|l| l.expect("line"))
        .collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(&lines[0]).expect("json");
    assert_eq!(record["level"], "error");
    assert_eq!(record["errno"], 0);
    assert_eq!(record["context"], "join");
    assert_eq!(record["message"], "Could not join thread as it is null.");
    assert!(record["location"].as_str().unwrap().contains("lifecycle.rs"));

    let _ = std::fs::remove_file(&path);
}
