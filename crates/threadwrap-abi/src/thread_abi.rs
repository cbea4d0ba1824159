//! `createThread` / `destroyThread` and the attribute helpers behind them.
//!
//! Handles and attributes cross the boundary as the raw pointers produced by
//! `into_raw` in `threadwrap-core`; a pointer returned here must be passed
//! back to the matching destroy function exactly once.

use std::ffi::{c_int, c_void};
use std::sync::OnceLock;

use threadwrap_core::{EntryFn, Lifecycle, ThreadError};

const CREATE_THREAD: &str = "create_thread";

/// Process-wide lifecycle, configured from the environment on first use.
pub fn lifecycle() -> &'static Lifecycle {
    static LIFECYCLE: OnceLock<Lifecycle> = OnceLock::new();
    LIFECYCLE.get_or_init(Lifecycle::from_env)
}

fn set_errno(code: c_int) {
    #[cfg(target_os = "linux")]
    // SAFETY: __errno_location always returns the calling thread's errno slot.
    unsafe {
        *libc::__errno_location() = code;
    }
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    // SAFETY: __error always returns the calling thread's errno slot.
    unsafe {
        *libc::__error() = code;
    }
    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    )))]
    let _ = code;
}

/// errno for a C caller. Failures with no OS code (null arguments) map to
/// `EINVAL`.
fn errno_for(err: &ThreadError) -> c_int {
    match err.errno() {
        0 => libc::EINVAL,
        code => code,
    }
}

fn status(result: Result<(), ThreadError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => {
            set_errno(errno_for(&err));
            1
        }
    }
}

/// Start a joinable thread running `function(arg)`.
///
/// Returns the thread handle, or null on failure with `errno` set. A null
/// `function` is rejected.
#[unsafe(export_name = "createThread")]
pub unsafe extern "C" fn create_thread(
    function: Option<EntryFn>,
    arg: *mut c_void,
) -> *mut libc::pthread_t {
    let lc = lifecycle();
    let Some(function) = function else {
        threadwrap_core::report!(
            lc.reporter(),
            0,
            CREATE_THREAD,
            "Could not create thread as its function is null."
        );
        set_errno(libc::EINVAL);
        return std::ptr::null_mut();
    };
    // SAFETY: keeping arg valid for the thread is the C caller's contract.
    match unsafe { lc.spawn(function, arg) } {
        Ok(handle) => handle.into_raw(),
        Err(err) => {
            set_errno(errno_for(&err));
            std::ptr::null_mut()
        }
    }
}

/// Join and free a thread returned by [`create_thread`].
///
/// Returns `0` on success, `1` on failure with `errno` set. The handle is
/// freed in both cases, except when it is null.
#[unsafe(export_name = "destroyThread")]
pub unsafe extern "C" fn destroy_thread(thread: *mut libc::pthread_t) -> c_int {
    // SAFETY: thread is null or came from create_thread (C caller contract).
    status(unsafe { lifecycle().join_raw(thread) })
}

/// Allocate a joinable thread attribute. Null on failure with `errno` set.
#[unsafe(export_name = "createThreadAttribute")]
pub unsafe extern "C" fn create_thread_attribute() -> *mut libc::pthread_attr_t {
    match lifecycle().attributes().create() {
        Ok(attr) => attr.into_raw(),
        Err(err) => {
            set_errno(errno_for(&err));
            std::ptr::null_mut()
        }
    }
}

/// Destroy and free an attribute returned by [`create_thread_attribute`].
///
/// Returns `0` on success, `1` on failure with `errno` set.
#[unsafe(export_name = "destroyThreadAttribute")]
pub unsafe extern "C" fn destroy_thread_attribute(attr: *mut libc::pthread_attr_t) -> c_int {
    // SAFETY: attr is null or came from create_thread_attribute.
    status(unsafe { lifecycle().attributes().destroy_raw(attr) })
}
