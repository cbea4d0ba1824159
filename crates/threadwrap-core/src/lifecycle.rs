//! Thread lifecycle controller: spawn and join.
//!
//! `spawn` walks attribute creation → handle allocation → thread start →
//! attribute destruction. Whatever was acquired before a failing step is
//! released before the error is returned, and a caller never receives a
//! handle on failure. `join` waits for the thread and frees the handle's
//! memory whether or not the OS join succeeded.
//!
//! Per thread the states are `Unstarted → Running → Joined`. A live
//! [`ThreadHandle`] is the `Running` state; [`ThreadHandle::join`] consumes it.
//! There is no detach operation.

use std::ffi::c_void;
use std::fmt;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::attr::AttributeManager;
use crate::config::{Config, TeardownPolicy};
use crate::error::{ErrorKind, Resource, ThreadError};
use crate::report::{ConfiguredReporter, Reporter};
use crate::sys::{EntryFn, HandleSlot, PosixSys, RawThread, ThreadSys};

const SPAWN: &str = "spawn";
const JOIN: &str = "join";

/// Owns the OS seam, the reporter, and the teardown policy shared by every
/// spawn and join.
pub struct Lifecycle<S = PosixSys, R = ConfiguredReporter> {
    sys: S,
    reporter: R,
    teardown: TeardownPolicy,
}

impl Lifecycle<PosixSys, ConfiguredReporter> {
    /// Host pthreads with the reporter and policy named by `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(PosixSys, ConfiguredReporter::from_config(config)).with_teardown(config.teardown)
    }

    /// [`from_config`](Self::from_config) with [`Config::from_env`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_config(&Config::from_env())
    }
}

impl<S: ThreadSys, R: Reporter> Lifecycle<S, R> {
    pub fn new(sys: S, reporter: R) -> Self {
        Self {
            sys,
            reporter,
            teardown: TeardownPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn sys(&self) -> &S {
        &self.sys
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn teardown(&self) -> TeardownPolicy {
        self.teardown
    }

    pub fn attributes(&self) -> AttributeManager<'_, S, R> {
        AttributeManager::new(&self.sys, &self.reporter)
    }

    /// Start a joinable thread running `entry(arg)`.
    ///
    /// Errors:
    /// - [`ThreadError::AttributeCreation`]: no attribute; nothing else tried.
    /// - [`ThreadError::Allocation`]: no handle memory; attribute destroyed.
    /// - [`ThreadError::ThreadStart`]: the OS refused; attribute destroyed and
    ///   handle memory freed.
    /// - [`ThreadError::AttributeTeardown`]: only under
    ///   [`TeardownPolicy::Strict`]. The thread *is* running but no handle is
    ///   returned, so it can never be joined.
    ///
    /// # Safety
    ///
    /// `arg` must remain valid for everything `entry` does with it, which may
    /// be until the thread is joined.
    pub unsafe fn spawn(
        &self,
        entry: EntryFn,
        arg: *mut c_void,
    ) -> Result<ThreadHandle<'_, S, R>, ThreadError> {
        let attr = self
            .attributes()
            .create()
            .map_err(ThreadError::into_creation_failure)?;

        let Some(mut slot) = self.sys.alloc_handle() else {
            crate::report!(
                self.reporter,
                libc::ENOMEM,
                SPAWN,
                "Could not allocate memory for thread."
            );
            drop(attr);
            return Err(ThreadError::Allocation {
                resource: Resource::Handle,
                errno: libc::ENOMEM,
            });
        };

        // SAFETY: attr is initialized; arg validity is the caller's contract.
        let rc = unsafe { self.sys.start(&mut slot, attr.as_raw(), entry, arg) };
        if rc != 0 {
            crate::report!(self.reporter, rc, SPAWN, "Could not create thread.");
            drop(attr);
            self.sys.release_handle(slot);
            return Err(ThreadError::ThreadStart { errno: rc });
        }

        let handle = ThreadHandle {
            slot: ManuallyDrop::new(slot),
            lifecycle: self,
        };

        if let Err(err) = attr.destroy() {
            match self.teardown {
                TeardownPolicy::KeepHandle => {}
                // Already reported by the attribute manager.
                TeardownPolicy::Strict => {
                    handle.abandon();
                    return Err(ThreadError::AttributeTeardown { errno: err.errno() });
                }
            }
        }

        Ok(handle)
    }

    /// Start a joinable thread running a closure.
    ///
    /// The closure is reclaimed if the thread never started. A panic inside
    /// the closure ends that thread only.
    pub fn spawn_fn<F>(&self, f: F) -> Result<ThreadHandle<'_, S, R>, ThreadError>
    where
        F: FnOnce() + Send + 'static,
    {
        extern "C" fn trampoline<F: FnOnce()>(arg: *mut c_void) -> *mut c_void {
            // SAFETY: arg is the Box<F> leaked by spawn_fn and is consumed only here.
            let f = unsafe { Box::from_raw(arg.cast::<F>()) };
            let _ = catch_unwind(AssertUnwindSafe(move || f()));
            std::ptr::null_mut()
        }

        let arg = Box::into_raw(Box::new(f)).cast::<c_void>();
        // SAFETY: the boxed closure is owned by the new thread once it starts.
        match unsafe { self.spawn(trampoline::<F>, arg) } {
            Ok(handle) => Ok(handle),
            Err(err) => {
                if err.kind() != ErrorKind::AttributeTeardownFailure {
                    // SAFETY: the thread never started, so nothing else owns arg.
                    drop(unsafe { Box::from_raw(arg.cast::<F>()) });
                }
                Err(err)
            }
        }
    }

    /// Join `handle`. Same as [`ThreadHandle::join`].
    pub fn join(&self, handle: ThreadHandle<'_, S, R>) -> Result<(), ThreadError> {
        handle.join()
    }

    /// Join a handle previously leaked with [`ThreadHandle::into_raw`].
    ///
    /// A null pointer fails with [`ThreadError::NullArgument`] and touches
    /// nothing.
    ///
    /// # Safety
    ///
    /// A non-null `thread` must come from `into_raw` on a handle spawned
    /// through a lifecycle over the same [`ThreadSys`], and must not be used
    /// afterwards.
    pub unsafe fn join_raw(&self, thread: *mut RawThread) -> Result<(), ThreadError> {
        if thread.is_null() {
            crate::report!(
                self.reporter,
                0,
                JOIN,
                "Could not join thread as it is null."
            );
            return Err(ThreadError::NullArgument {
                what: "thread handle",
            });
        }
        // SAFETY: caller guarantees the pointer came from Box::into_raw in into_raw.
        let slot: HandleSlot = unsafe { Box::from_raw(thread.cast::<MaybeUninit<RawThread>>()) };
        self.join_slot(slot)
    }

    /// Join, then free handle memory regardless of the outcome.
    fn join_slot(&self, slot: HandleSlot) -> Result<(), ThreadError> {
        // SAFETY: slots only reach here after a successful start.
        let thread = unsafe { slot.assume_init_read() };
        // SAFETY: each slot is joined at most once; ownership enforces it.
        let rc = unsafe { self.sys.join(thread) };
        self.sys.release_handle(slot);
        if rc != 0 {
            crate::report!(self.reporter, rc, JOIN, "Could not join thread.");
            return Err(ThreadError::ThreadJoin { errno: rc });
        }
        Ok(())
    }
}

impl<S, R> fmt::Debug for Lifecycle<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("teardown", &self.teardown)
            .finish_non_exhaustive()
    }
}

/// A started, not yet joined thread.
///
/// Dropping a handle without joining it joins it (blocking), reporting any
/// failure.
#[must_use = "a thread handle must be joined"]
pub struct ThreadHandle<'l, S: ThreadSys, R: Reporter> {
    slot: ManuallyDrop<HandleSlot>,
    lifecycle: &'l Lifecycle<S, R>,
}

impl<S: ThreadSys, R: Reporter> ThreadHandle<'_, S, R> {
    /// Native identifier of the thread.
    #[must_use]
    pub fn thread_id(&self) -> RawThread {
        // SAFETY: a handle only exists after a successful start.
        unsafe { self.slot.assume_init_read() }
    }

    /// Block until the thread finishes, then free the handle.
    ///
    /// Handle memory is freed even when the OS join fails.
    pub fn join(self) -> Result<(), ThreadError> {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the slot is moved out exactly once.
        let slot = unsafe { ManuallyDrop::take(&mut this.slot) };
        this.lifecycle.join_slot(slot)
    }

    /// Give up ownership, for handing the handle across the C boundary.
    #[must_use]
    pub fn into_raw(self) -> *mut RawThread {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the slot is moved out exactly once.
        let slot = unsafe { ManuallyDrop::take(&mut this.slot) };
        Box::into_raw(slot).cast::<RawThread>()
    }

    /// Free handle memory without joining. The thread keeps running.
    fn abandon(self) {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the slot is moved out exactly once.
        let slot = unsafe { ManuallyDrop::take(&mut this.slot) };
        this.lifecycle.sys.release_handle(slot);
    }
}

impl<S: ThreadSys, R: Reporter> Drop for ThreadHandle<'_, S, R> {
    fn drop(&mut self) {
        // SAFETY: drop runs once and the slot is not touched afterwards.
        let slot = unsafe { ManuallyDrop::take(&mut self.slot) };
        let _ = self.lifecycle.join_slot(slot);
    }
}

impl<S: ThreadSys, R: Reporter> fmt::Debug for ThreadHandle<'_, S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle").finish_non_exhaustive()
    }
}
