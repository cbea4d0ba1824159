//! Fault injection over a real [`ThreadSys`].
//!
//! [`FaultSys`] forwards to an inner implementation, fails any armed step with
//! a chosen errno, and keeps counters of calls and live allocations so tests
//! can check call ordering and leaks.

use std::collections::HashMap;
use std::ffi::{c_int, c_void};
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::sys::{AttrSlot, EntryFn, HandleSlot, PosixSys, RawAttr, RawThread, ThreadSys};

/// A step of the lifecycle that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    AttrAlloc,
    AttrInit,
    AttrSetDetachState,
    AttrDestroy,
    HandleAlloc,
    Start,
    Join,
}

impl FaultPoint {
    pub const ALL: [Self; 7] = [
        Self::AttrAlloc,
        Self::AttrInit,
        Self::AttrSetDetachState,
        Self::AttrDestroy,
        Self::HandleAlloc,
        Self::Start,
        Self::Join,
    ];

    const fn index(self) -> usize {
        match self {
            Self::AttrAlloc => 0,
            Self::AttrInit => 1,
            Self::AttrSetDetachState => 2,
            Self::AttrDestroy => 3,
            Self::HandleAlloc => 4,
            Self::Start => 5,
            Self::Join => 6,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttrAlloc => "attr_alloc",
            Self::AttrInit => "attr_init",
            Self::AttrSetDetachState => "attr_set_detach_state",
            Self::AttrDestroy => "attr_destroy",
            Self::HandleAlloc => "handle_alloc",
            Self::Start => "start",
            Self::Join => "join",
        }
    }
}

/// [`ThreadSys`] wrapper with armable failures and bookkeeping.
#[derive(Debug, Default)]
pub struct FaultSys<S = PosixSys> {
    inner: S,
    armed: Mutex<HashMap<FaultPoint, c_int>>,
    calls: [AtomicUsize; 7],
    live_attrs: AtomicIsize,
    live_handles: AtomicIsize,
    detach_states: Mutex<Vec<c_int>>,
}

impl FaultSys<PosixSys> {
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(PosixSys)
    }
}

impl<S: ThreadSys> FaultSys<S> {
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            armed: Mutex::new(HashMap::new()),
            calls: Default::default(),
            live_attrs: AtomicIsize::new(0),
            live_handles: AtomicIsize::new(0),
            detach_states: Mutex::new(Vec::new()),
        }
    }

    /// Make every later call at `point` fail with `errno`.
    pub fn arm(&self, point: FaultPoint, errno: c_int) -> &Self {
        self.armed.lock().insert(point, errno);
        self
    }

    pub fn disarm(&self, point: FaultPoint) -> &Self {
        self.armed.lock().remove(&point);
        self
    }

    /// Number of times `point` was reached, failed or not.
    #[must_use]
    pub fn calls(&self, point: FaultPoint) -> usize {
        self.calls[point.index()].load(Ordering::SeqCst)
    }

    /// Attribute allocations not yet released.
    #[must_use]
    pub fn live_attrs(&self) -> isize {
        self.live_attrs.load(Ordering::SeqCst)
    }

    /// Handle allocations not yet released.
    #[must_use]
    pub fn live_handles(&self) -> isize {
        self.live_handles.load(Ordering::SeqCst)
    }

    /// Every detach state ever requested, in order.
    #[must_use]
    pub fn detach_states(&self) -> Vec<c_int> {
        self.detach_states.lock().clone()
    }

    fn hit(&self, point: FaultPoint) -> Option<c_int> {
        self.calls[point.index()].fetch_add(1, Ordering::SeqCst);
        self.armed.lock().get(&point).copied()
    }
}

impl<S: ThreadSys> ThreadSys for FaultSys<S> {
    fn alloc_attr(&self) -> Option<AttrSlot> {
        if self.hit(FaultPoint::AttrAlloc).is_some() {
            return None;
        }
        let slot = self.inner.alloc_attr()?;
        self.live_attrs.fetch_add(1, Ordering::SeqCst);
        Some(slot)
    }

    fn release_attr(&self, slot: AttrSlot) {
        self.live_attrs.fetch_sub(1, Ordering::SeqCst);
        self.inner.release_attr(slot);
    }

    fn alloc_handle(&self) -> Option<HandleSlot> {
        if self.hit(FaultPoint::HandleAlloc).is_some() {
            return None;
        }
        let slot = self.inner.alloc_handle()?;
        self.live_handles.fetch_add(1, Ordering::SeqCst);
        Some(slot)
    }

    fn release_handle(&self, slot: HandleSlot) {
        self.live_handles.fetch_sub(1, Ordering::SeqCst);
        self.inner.release_handle(slot);
    }

    fn attr_init(&self, attr: &mut MaybeUninit<RawAttr>) -> c_int {
        if let Some(errno) = self.hit(FaultPoint::AttrInit) {
            return errno;
        }
        self.inner.attr_init(attr)
    }

    unsafe fn attr_set_detach_state(
        &self,
        attr: &mut MaybeUninit<RawAttr>,
        state: c_int,
    ) -> c_int {
        self.detach_states.lock().push(state);
        if let Some(errno) = self.hit(FaultPoint::AttrSetDetachState) {
            return errno;
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.attr_set_detach_state(attr, state) }
    }

    unsafe fn attr_destroy(&self, attr: &mut MaybeUninit<RawAttr>) -> c_int {
        let injected = self.hit(FaultPoint::AttrDestroy);
        // An injected failure still releases the OS-level attribute.
        // SAFETY: forwarded caller contract.
        let rc = unsafe { self.inner.attr_destroy(attr) };
        injected.unwrap_or(rc)
    }

    unsafe fn start(
        &self,
        out: &mut MaybeUninit<RawThread>,
        attr: &MaybeUninit<RawAttr>,
        entry: EntryFn,
        arg: *mut c_void,
    ) -> c_int {
        if let Some(errno) = self.hit(FaultPoint::Start) {
            return errno;
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.start(out, attr, entry, arg) }
    }

    unsafe fn join(&self, thread: RawThread) -> c_int {
        let injected = self.hit(FaultPoint::Join);
        // An injected failure still reaps the thread.
        // SAFETY: forwarded caller contract.
        let rc = unsafe { self.inner.join(thread) };
        injected.unwrap_or(rc)
    }
}
