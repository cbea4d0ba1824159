//! Integration tests: scenarios over host pthreads and injected faults.

use threadwrap_core::{
    ErrorKind, FaultPoint, FaultSys, Lifecycle, MemoryReporter, PosixSys, SilentReporter,
};
use threadwrap_harness::{
    Expected, Observed, ScenarioError, default_fault_matrix, run_counter, run_fanout,
    run_fault_case,
};

#[test]
fn fanout_of_one_hundred_joins_every_thread() {
    let lc = Lifecycle::new(FaultSys::new(), SilentReporter);
    assert_eq!(run_fanout(&lc, 100).expect("fanout"), 100);
    assert_eq!(lc.sys().calls(FaultPoint::Start), 100);
    assert_eq!(lc.sys().calls(FaultPoint::Join), 100);
    assert_eq!(lc.sys().live_handles(), 0);
}

#[test]
fn every_default_fault_case_behaves_as_documented() {
    for case in default_fault_matrix() {
        let outcome = run_fault_case(&case)
            .unwrap_or_else(|err| panic!("{} diverged: {err}", case.name()));
        match (case.expected, outcome.observed) {
            (Expected::Succeeds, Observed::Joined) => {}
            (Expected::JoinFails, Observed::JoinFailed(err)) => {
                assert_eq!(err.errno(), case.errno);
            }
            (Expected::SpawnFails(kind), Observed::SpawnFailed(err)) => {
                assert_eq!(err.kind(), kind);
                assert!(outcome.reports >= 1, "{} was not reported", case.name());
            }
            (expected, observed) => panic!("{}: {expected} vs {observed}", case.name()),
        }
    }
}

#[test]
fn start_failure_surfaces_through_counter() {
    let lc = Lifecycle::new(FaultSys::new(), MemoryReporter::new());
    lc.sys().arm(FaultPoint::Start, libc::EAGAIN);
    let err = run_counter(&lc).unwrap_err();
    let thread_err = err.thread_error().expect("lifecycle failure");
    assert_eq!(thread_err.kind(), ErrorKind::ThreadStartFailure);
    assert_eq!(thread_err.errno(), libc::EAGAIN);
    assert_eq!(lc.reporter().len(), 1);
}

#[test]
fn fanout_stops_at_first_failed_spawn_and_joins_the_rest() {
    let lc = Lifecycle::new(FaultSys::new(), MemoryReporter::new());
    lc.sys().arm(FaultPoint::HandleAlloc, libc::ENOMEM);
    let err = run_fanout(&lc, 8).unwrap_err();
    assert!(matches!(err, ScenarioError::Thread(_)));
    assert_eq!(lc.sys().live_handles(), 0);
    assert_eq!(lc.sys().live_attrs(), 0);
}

#[test]
fn counter_on_host_pthreads() {
    let lc = Lifecycle::new(PosixSys, SilentReporter);
    assert_eq!(run_counter(&lc).expect("counter"), 1);
}
