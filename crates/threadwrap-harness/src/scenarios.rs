//! Harness scenarios.
//!
//! Each scenario returns `Ok` with what it observed when the lifecycle behaved
//! as documented, and a [`ScenarioError`] describing the first divergence
//! otherwise.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use threadwrap_core::{
    ErrorKind, FaultPoint, FaultSys, Lifecycle, MemoryReporter, Reporter, TeardownPolicy,
    ThreadError, ThreadSys,
};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Thread(#[from] ThreadError),
    #[error("{scenario}: expected {expected}, observed {observed}")]
    Mismatch {
        scenario: String,
        expected: String,
        observed: String,
    },
    #[error("{scenario}: {attrs} attribute(s) and {handles} handle(s) still live")]
    Leak {
        scenario: String,
        attrs: isize,
        handles: isize,
    },
}

impl ScenarioError {
    fn mismatch(
        scenario: impl Into<String>,
        expected: impl fmt::Display,
        observed: impl fmt::Display,
    ) -> Self {
        Self::Mismatch {
            scenario: scenario.into(),
            expected: expected.to_string(),
            observed: observed.to_string(),
        }
    }

    /// errno and kind of the underlying lifecycle failure, if any.
    #[must_use]
    pub fn thread_error(&self) -> Option<&ThreadError> {
        match self {
            Self::Thread(err) => Some(err),
            _ => None,
        }
    }
}

/// Short name for a teardown policy, as written in logs.
#[must_use]
pub const fn teardown_name(policy: TeardownPolicy) -> &'static str {
    match policy {
        TeardownPolicy::KeepHandle => "keep",
        TeardownPolicy::Strict => "strict",
    }
}

// ---------------------------------------------------------------------------
// Counter and fan-out
// ---------------------------------------------------------------------------

/// Spawn one thread that increments a shared counter, join it, and check the
/// counter reads exactly 1.
pub fn run_counter<S: ThreadSys, R: Reporter>(
    lifecycle: &Lifecycle<S, R>,
) -> Result<usize, ScenarioError> {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    let handle = lifecycle.spawn_fn(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    })?;
    handle.join()?;

    let observed = counter.load(Ordering::SeqCst);
    if observed != 1 {
        return Err(ScenarioError::mismatch("counter", 1, observed));
    }
    Ok(observed)
}

/// Spawn `threads` threads, each marking its own slot, then join them all.
///
/// Every slot must be marked exactly once. Returns the number of threads
/// joined.
pub fn run_fanout<S: ThreadSys, R: Reporter>(
    lifecycle: &Lifecycle<S, R>,
    threads: usize,
) -> Result<usize, ScenarioError> {
    let slots: Arc<Vec<AtomicUsize>> =
        Arc::new((0..threads).map(|_| AtomicUsize::new(0)).collect());

    // Handles collected before a failed spawn are joined when dropped.
    let handles = (0..threads)
        .map(|index| {
            let slots = Arc::clone(&slots);
            lifecycle.spawn_fn(move || {
                slots[index].fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut joined = 0;
    for handle in handles {
        handle.join()?;
        joined += 1;
    }

    for (index, slot) in slots.iter().enumerate() {
        let hits = slot.load(Ordering::SeqCst);
        if hits != 1 {
            return Err(ScenarioError::mismatch(
                format!("fanout[{index}]"),
                "1 run",
                format!("{hits} runs"),
            ));
        }
    }
    Ok(joined)
}

// ---------------------------------------------------------------------------
// Fault matrix
// ---------------------------------------------------------------------------

/// Documented result of a single injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    SpawnFails(ErrorKind),
    JoinFails,
    Succeeds,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFails(kind) => write!(f, "spawn fails with {}", kind.as_str()),
            Self::JoinFails => f.write_str("join fails with thread_join_failure"),
            Self::Succeeds => f.write_str("spawn and join succeed"),
        }
    }
}

/// What a fault case actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    SpawnFailed(ThreadError),
    JoinFailed(ThreadError),
    Joined,
}

impl Observed {
    #[must_use]
    pub fn error(&self) -> Option<&ThreadError> {
        match self {
            Self::SpawnFailed(err) | Self::JoinFailed(err) => Some(err),
            Self::Joined => None,
        }
    }
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(err) => write!(f, "spawn failed with {} ({err})", err.kind().as_str()),
            Self::JoinFailed(err) => write!(f, "join failed with {} ({err})", err.kind().as_str()),
            Self::Joined => f.write_str("spawn and join succeeded"),
        }
    }
}

/// One armed failure and the outcome it must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultCase {
    pub point: FaultPoint,
    pub errno: i32,
    pub teardown: TeardownPolicy,
    pub expected: Expected,
}

impl FaultCase {
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.point.as_str(), teardown_name(self.teardown))
    }
}

/// Result of a fault case that behaved as documented.
#[derive(Debug, Clone)]
pub struct FaultOutcome {
    pub case: FaultCase,
    pub observed: Observed,
    /// Failure reports emitted while the case ran.
    pub reports: usize,
}

/// Every lifecycle step, failed once, with the outcome each must produce.
#[must_use]
pub fn default_fault_matrix() -> Vec<FaultCase> {
    use TeardownPolicy::{KeepHandle, Strict};

    let case = |point, errno, teardown, expected| FaultCase {
        point,
        errno,
        teardown,
        expected,
    };
    vec![
        case(
            FaultPoint::AttrAlloc,
            libc::ENOMEM,
            KeepHandle,
            Expected::SpawnFails(ErrorKind::AttributeCreationFailure),
        ),
        case(
            FaultPoint::AttrInit,
            libc::EAGAIN,
            KeepHandle,
            Expected::SpawnFails(ErrorKind::AttributeCreationFailure),
        ),
        case(
            FaultPoint::AttrSetDetachState,
            libc::EINVAL,
            KeepHandle,
            Expected::SpawnFails(ErrorKind::AttributeCreationFailure),
        ),
        case(
            FaultPoint::HandleAlloc,
            libc::ENOMEM,
            KeepHandle,
            Expected::SpawnFails(ErrorKind::AllocationFailure),
        ),
        case(
            FaultPoint::Start,
            libc::EAGAIN,
            KeepHandle,
            Expected::SpawnFails(ErrorKind::ThreadStartFailure),
        ),
        case(FaultPoint::AttrDestroy, libc::EBUSY, KeepHandle, Expected::Succeeds),
        case(
            FaultPoint::AttrDestroy,
            libc::EBUSY,
            Strict,
            Expected::SpawnFails(ErrorKind::AttributeTeardownFailure),
        ),
        case(FaultPoint::Join, libc::ESRCH, KeepHandle, Expected::JoinFails),
    ]
}

/// Run one fault case against a fresh lifecycle over host pthreads.
///
/// Checks the outcome, the errno carried by the error, that no attribute or
/// handle memory is left live, and that the entry function ran exactly when
/// it should have.
pub fn run_fault_case(case: &FaultCase) -> Result<FaultOutcome, ScenarioError> {
    let name = case.name();
    let lifecycle =
        Lifecycle::new(FaultSys::new(), MemoryReporter::new()).with_teardown(case.teardown);
    lifecycle.sys().arm(case.point, case.errno);

    let ran = Arc::new(AtomicUsize::new(0));
    let hit = Arc::clone(&ran);
    let observed = match lifecycle.spawn_fn(move || {
        hit.fetch_add(1, Ordering::SeqCst);
    }) {
        Err(err) => Observed::SpawnFailed(err),
        Ok(handle) => match handle.join() {
            Ok(()) => Observed::Joined,
            Err(err) => Observed::JoinFailed(err),
        },
    };

    let matches = match (case.expected, &observed) {
        (Expected::SpawnFails(kind), Observed::SpawnFailed(err)) => err.kind() == kind,
        (Expected::JoinFails, Observed::JoinFailed(err)) => {
            err.kind() == ErrorKind::ThreadJoinFailure
        }
        (Expected::Succeeds, Observed::Joined) => true,
        _ => false,
    };
    if !matches {
        return Err(ScenarioError::mismatch(&name, case.expected, observed));
    }

    if let Some(err) = observed.error()
        && err.errno() != case.errno
    {
        return Err(ScenarioError::mismatch(
            &name,
            format!("errno {}", case.errno),
            format!("errno {}", err.errno()),
        ));
    }

    let sys = lifecycle.sys();
    if sys.live_attrs() != 0 || sys.live_handles() != 0 {
        return Err(ScenarioError::Leak {
            scenario: name,
            attrs: sys.live_attrs(),
            handles: sys.live_handles(),
        });
    }

    match observed {
        // Started, then abandoned: still running, never joined.
        Observed::SpawnFailed(err) if err.kind() == ErrorKind::AttributeTeardownFailure => {
            if sys.calls(FaultPoint::Start) != 1 || sys.calls(FaultPoint::Join) != 0 {
                return Err(ScenarioError::mismatch(
                    &name,
                    "one start and no join",
                    format!(
                        "{} start(s) and {} join(s)",
                        sys.calls(FaultPoint::Start),
                        sys.calls(FaultPoint::Join)
                    ),
                ));
            }
        }
        Observed::SpawnFailed(_) => {
            let runs = ran.load(Ordering::SeqCst);
            if runs != 0 {
                return Err(ScenarioError::mismatch(&name, "0 runs", format!("{runs} runs")));
            }
        }
        Observed::JoinFailed(_) | Observed::Joined => {
            let runs = ran.load(Ordering::SeqCst);
            if runs != 1 {
                return Err(ScenarioError::mismatch(&name, "1 run", format!("{runs} runs")));
            }
        }
    }

    let reports = lifecycle.reporter().len();
    if observed.error().is_some() && reports == 0 {
        return Err(ScenarioError::mismatch(&name, "a failure report", "none"));
    }

    Ok(FaultOutcome {
        case: *case,
        observed,
        reports,
    })
}
