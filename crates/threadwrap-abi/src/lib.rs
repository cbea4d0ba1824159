// Every export takes raw pointers from C callers; the per-function docs state
// the ownership rules instead of separate safety sections.
#![allow(clippy::missing_safety_doc)]
//! # threadwrap-abi
//!
//! C ABI for threadwrap. Produces a `cdylib` exporting:
//!
//! ```c
//! pthread_t *createThread(void *(*function)(void *), void *functionArguments);
//! int destroyThread(pthread_t *thread);
//! pthread_attr_t *createThreadAttribute(void);
//! int destroyThreadAttribute(pthread_attr_t *attribute);
//! ```
//!
//! Threads are always joinable. `destroyThread` joins, then frees the handle.
//! Failures return null or `1`, set `errno`, and are reported through the
//! reporter selected by `THREADWRAP_REPORT`.

#![cfg(unix)]

pub mod thread_abi;

pub use thread_abi::{
    create_thread, create_thread_attribute, destroy_thread, destroy_thread_attribute, lifecycle,
};
