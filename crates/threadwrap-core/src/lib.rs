//! Joinable-only pthread lifecycle.
//!
//! Two operations, each checked at every step:
//!
//! - [`Lifecycle::spawn`] creates a joinable attribute, allocates a handle,
//!   starts the thread, and destroys the attribute. Anything acquired before a
//!   failing step is released before the error is returned.
//! - [`ThreadHandle::join`] waits for the thread and frees the handle.
//!
//! Failures are returned as [`ThreadError`] values carrying the OS error code
//! and are reported once, where they are detected, through a [`Reporter`].
//! Threads are never detached.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use threadwrap_core::Lifecycle;
//!
//! let lifecycle = Lifecycle::from_env();
//! let hits = Arc::new(AtomicUsize::new(0));
//! let seen = Arc::clone(&hits);
//! let handle = lifecycle
//!     .spawn_fn(move || {
//!         seen.fetch_add(1, Ordering::SeqCst);
//!     })
//!     .unwrap();
//! handle.join().unwrap();
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

#![cfg(unix)]

#[allow(unsafe_code)]
pub mod attr;
pub mod config;
pub mod error;
#[allow(unsafe_code)]
pub mod fault;
#[allow(unsafe_code)]
pub mod lifecycle;
pub mod report;
#[allow(unsafe_code)]
pub mod sys;

pub use attr::{AttributeManager, ThreadAttribute};
pub use config::{Config, ReportMode, TeardownPolicy};
pub use error::{AttrStage, AttributeCause, ErrorKind, Resource, ThreadError};
pub use fault::{FaultPoint, FaultSys};
pub use lifecycle::{Lifecycle, ThreadHandle};
pub use report::{
    ConfiguredReporter, JsonlReporter, MemoryReporter, ReportRecord, Reporter, SilentReporter,
    Site, StderrReporter,
};
pub use sys::{EntryFn, PosixSys, RawAttr, RawThread, ThreadSys};
