//! OS threading facility.
//!
//! [`ThreadSys`] is the seam between the lifecycle logic and pthreads. Every
//! call returns the raw pthread status (`0` on success, an errno value
//! otherwise); turning those into [`ThreadError`](crate::ThreadError)s and
//! reporting them is the caller's job.

use std::alloc::{Layout, alloc};
use std::ffi::{c_int, c_void};
use std::mem::MaybeUninit;

/// Native attribute object.
pub type RawAttr = libc::pthread_attr_t;

/// Native thread identifier.
pub type RawThread = libc::pthread_t;

/// Thread entry point: takes the caller's argument, returns an opaque value
/// that this crate discards.
pub type EntryFn = extern "C" fn(*mut c_void) -> *mut c_void;

/// Heap slot for a native attribute.
pub type AttrSlot = Box<MaybeUninit<RawAttr>>;

/// Heap slot for a native thread identifier.
pub type HandleSlot = Box<MaybeUninit<RawThread>>;

/// Allocate uninitialized heap storage for `T`, returning `None` instead of
/// aborting when the allocator is out of memory.
#[must_use]
pub fn try_box_uninit<T>() -> Option<Box<MaybeUninit<T>>> {
    let layout = Layout::new::<MaybeUninit<T>>();
    if layout.size() == 0 {
        return Some(Box::new(MaybeUninit::uninit()));
    }
    // SAFETY: layout has non-zero size.
    let ptr = unsafe { alloc(layout) }.cast::<MaybeUninit<T>>();
    if ptr.is_null() {
        return None;
    }
    // SAFETY: ptr came from the global allocator with the layout Box uses for
    // MaybeUninit<T>, and MaybeUninit needs no initialization.
    Some(unsafe { Box::from_raw(ptr) })
}

/// Native thread operations used by the attribute manager and lifecycle
/// controller.
pub trait ThreadSys: Send + Sync {
    /// Backing memory for an attribute. `None` means out of memory.
    fn alloc_attr(&self) -> Option<AttrSlot> {
        try_box_uninit()
    }

    /// Free attribute backing memory. Does not touch OS-level state.
    fn release_attr(&self, slot: AttrSlot) {
        drop(slot);
    }

    /// Backing memory for a thread handle. `None` means out of memory.
    fn alloc_handle(&self) -> Option<HandleSlot> {
        try_box_uninit()
    }

    /// Free handle backing memory. Does not join or detach anything.
    fn release_handle(&self, slot: HandleSlot) {
        drop(slot);
    }

    /// `pthread_attr_init`.
    fn attr_init(&self, attr: &mut MaybeUninit<RawAttr>) -> c_int;

    /// `pthread_attr_setdetachstate`.
    ///
    /// # Safety
    ///
    /// `attr` must have been initialized by [`attr_init`](Self::attr_init) and
    /// not yet destroyed.
    unsafe fn attr_set_detach_state(&self, attr: &mut MaybeUninit<RawAttr>, state: c_int)
    -> c_int;

    /// `pthread_attr_destroy`.
    ///
    /// # Safety
    ///
    /// `attr` must have been initialized by [`attr_init`](Self::attr_init) and
    /// not yet destroyed.
    unsafe fn attr_destroy(&self, attr: &mut MaybeUninit<RawAttr>) -> c_int;

    /// `pthread_create`. On success `out` holds the new thread's identifier.
    ///
    /// # Safety
    ///
    /// `attr` must be initialized. `arg` must stay valid for as long as
    /// `entry` may use it.
    unsafe fn start(
        &self,
        out: &mut MaybeUninit<RawThread>,
        attr: &MaybeUninit<RawAttr>,
        entry: EntryFn,
        arg: *mut c_void,
    ) -> c_int;

    /// `pthread_join`, discarding the thread's return value.
    ///
    /// # Safety
    ///
    /// `thread` must identify a joinable thread that has not been joined yet.
    unsafe fn join(&self, thread: RawThread) -> c_int;
}

/// [`ThreadSys`] backed by the host pthread library.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixSys;

impl ThreadSys for PosixSys {
    fn attr_init(&self, attr: &mut MaybeUninit<RawAttr>) -> c_int {
        // SAFETY: pthread_attr_init only writes through the pointer.
        unsafe { libc::pthread_attr_init(attr.as_mut_ptr()) }
    }

    unsafe fn attr_set_detach_state(
        &self,
        attr: &mut MaybeUninit<RawAttr>,
        state: c_int,
    ) -> c_int {
        // SAFETY: caller guarantees attr is initialized.
        unsafe { libc::pthread_attr_setdetachstate(attr.as_mut_ptr(), state) }
    }

    unsafe fn attr_destroy(&self, attr: &mut MaybeUninit<RawAttr>) -> c_int {
        // SAFETY: caller guarantees attr is initialized and live.
        unsafe { libc::pthread_attr_destroy(attr.as_mut_ptr()) }
    }

    unsafe fn start(
        &self,
        out: &mut MaybeUninit<RawThread>,
        attr: &MaybeUninit<RawAttr>,
        entry: EntryFn,
        arg: *mut c_void,
    ) -> c_int {
        // SAFETY: out is writable, attr is initialized (caller contract), and
        // the caller keeps arg valid for the thread's use.
        unsafe { libc::pthread_create(out.as_mut_ptr(), attr.as_ptr(), entry, arg) }
    }

    unsafe fn join(&self, thread: RawThread) -> c_int {
        // SAFETY: caller guarantees thread is joinable and not yet joined.
        unsafe { libc::pthread_join(thread, std::ptr::null_mut()) }
    }
}
