//! Attribute manager: joinable-only `pthread_attr_t` objects.
//!
//! A [`ThreadAttribute`] is heap allocated, initialized, and forced to
//! `PTHREAD_CREATE_JOINABLE` before anyone can see it. It is destroyed either
//! explicitly with [`ThreadAttribute::destroy`], which returns the outcome, or
//! on drop, where a teardown failure is only reported.

use std::fmt;
use std::mem::{ManuallyDrop, MaybeUninit};

use crate::error::{AttrStage, Resource, ThreadError};
use crate::report::Reporter;
use crate::sys::{AttrSlot, RawAttr, ThreadSys};

const CREATE: &str = "create_attribute";
const DESTROY: &str = "destroy_attribute";

/// Creates and destroys [`ThreadAttribute`]s against one [`ThreadSys`].
pub struct AttributeManager<'a, S: ThreadSys, R: Reporter> {
    sys: &'a S,
    reporter: &'a R,
}

impl<S: ThreadSys, R: Reporter> Clone for AttributeManager<'_, S, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ThreadSys, R: Reporter> Copy for AttributeManager<'_, S, R> {}

impl<S: ThreadSys, R: Reporter> fmt::Debug for AttributeManager<'_, S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeManager").finish_non_exhaustive()
    }
}

impl<'a, S: ThreadSys, R: Reporter> AttributeManager<'a, S, R> {
    pub fn new(sys: &'a S, reporter: &'a R) -> Self {
        Self { sys, reporter }
    }

    /// Allocate and initialize a joinable attribute.
    ///
    /// Fails with [`ThreadError::Allocation`] or [`ThreadError::AttributeInit`];
    /// nothing is left allocated or initialized on failure.
    pub fn create(&self) -> Result<ThreadAttribute<'a, S, R>, ThreadError> {
        let Some(mut slot) = self.sys.alloc_attr() else {
            crate::report!(
                self.reporter,
                libc::ENOMEM,
                CREATE,
                "Could not allocate memory for attribute."
            );
            return Err(ThreadError::Allocation {
                resource: Resource::Attribute,
                errno: libc::ENOMEM,
            });
        };

        let rc = self.sys.attr_init(&mut slot);
        if rc != 0 {
            crate::report!(self.reporter, rc, CREATE, "Could not initialize attribute.");
            self.sys.release_attr(slot);
            return Err(ThreadError::AttributeInit {
                stage: AttrStage::Init,
                errno: rc,
            });
        }

        // SAFETY: slot was initialized by attr_init above.
        let rc = unsafe {
            self.sys
                .attr_set_detach_state(&mut slot, libc::PTHREAD_CREATE_JOINABLE)
        };
        if rc != 0 {
            crate::report!(self.reporter, rc, CREATE, "Could not set detach state.");
            // SAFETY: initialized above and not destroyed yet.
            let destroy_rc = unsafe { self.sys.attr_destroy(&mut slot) };
            if destroy_rc != 0 {
                crate::report!(
                    self.reporter,
                    destroy_rc,
                    CREATE,
                    "Could not destroy partially initialized attribute."
                );
            }
            self.sys.release_attr(slot);
            return Err(ThreadError::AttributeInit {
                stage: AttrStage::SetDetachState,
                errno: rc,
            });
        }

        Ok(ThreadAttribute {
            slot: ManuallyDrop::new(slot),
            manager: *self,
        })
    }

    /// Destroy an attribute previously leaked with [`ThreadAttribute::into_raw`].
    ///
    /// A null pointer fails with [`ThreadError::NullArgument`] and touches
    /// nothing.
    ///
    /// # Safety
    ///
    /// A non-null `attr` must come from `into_raw` on an attribute created by a
    /// manager over the same [`ThreadSys`], and must not be used afterwards.
    pub unsafe fn destroy_raw(&self, attr: *mut RawAttr) -> Result<(), ThreadError> {
        if attr.is_null() {
            crate::report!(
                self.reporter,
                0,
                DESTROY,
                "Could not destroy attribute as it is null."
            );
            return Err(ThreadError::NullArgument { what: "attribute" });
        }
        // SAFETY: caller guarantees attr came from Box::into_raw in into_raw.
        let slot: AttrSlot = unsafe { Box::from_raw(attr.cast::<MaybeUninit<RawAttr>>()) };
        self.destroy_slot(slot)
    }

    /// Tear down OS state, then free backing memory regardless of the outcome.
    fn destroy_slot(&self, mut slot: AttrSlot) -> Result<(), ThreadError> {
        // SAFETY: every slot reaching here was fully initialized by create.
        let rc = unsafe { self.sys.attr_destroy(&mut slot) };
        self.sys.release_attr(slot);
        if rc != 0 {
            crate::report!(self.reporter, rc, DESTROY, "Could not destroy attribute.");
            return Err(ThreadError::AttributeDestroy { errno: rc });
        }
        Ok(())
    }
}

/// An initialized, joinable thread attribute.
pub struct ThreadAttribute<'a, S: ThreadSys, R: Reporter> {
    slot: ManuallyDrop<AttrSlot>,
    manager: AttributeManager<'a, S, R>,
}

impl<S: ThreadSys, R: Reporter> ThreadAttribute<'_, S, R> {
    /// The native attribute, for passing to thread creation.
    #[must_use]
    pub fn as_raw(&self) -> &MaybeUninit<RawAttr> {
        &self.slot
    }

    /// Destroy the attribute and free its memory.
    ///
    /// Memory is freed even when the OS reports a destroy failure.
    pub fn destroy(self) -> Result<(), ThreadError> {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the slot is moved out exactly once.
        let slot = unsafe { ManuallyDrop::take(&mut this.slot) };
        this.manager.destroy_slot(slot)
    }

    /// Give up ownership, for handing the attribute across the C boundary.
    #[must_use]
    pub fn into_raw(self) -> *mut RawAttr {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the slot is moved out exactly once.
        let slot = unsafe { ManuallyDrop::take(&mut this.slot) };
        Box::into_raw(slot).cast::<RawAttr>()
    }
}

impl<S: ThreadSys, R: Reporter> Drop for ThreadAttribute<'_, S, R> {
    fn drop(&mut self) {
        // SAFETY: drop runs once and the slot is not touched afterwards.
        let slot = unsafe { ManuallyDrop::take(&mut self.slot) };
        let _ = self.manager.destroy_slot(slot);
    }
}

impl<S: ThreadSys, R: Reporter> fmt::Debug for ThreadAttribute<'_, S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadAttribute").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fault::{FaultPoint, FaultSys};
    use crate::report::MemoryReporter;

    #[test]
    fn create_forces_joinable_and_destroy_frees() {
        let sys = FaultSys::new();
        let reporter = MemoryReporter::new();
        let manager = AttributeManager::new(&sys, &reporter);

        let attr = manager.create().expect("attribute");
        assert_eq!(sys.live_attrs(), 1);
        assert_eq!(sys.detach_states(), vec![libc::PTHREAD_CREATE_JOINABLE]);

        attr.destroy().expect("destroy");
        assert_eq!(sys.live_attrs(), 0);
        assert_eq!(sys.calls(FaultPoint::AttrDestroy), 1);
        assert!(reporter.is_empty());
    }

    #[test]
    fn allocation_failure_reports_enomem() {
        let sys = FaultSys::new();
        sys.arm(FaultPoint::AttrAlloc, libc::ENOMEM);
        let reporter = MemoryReporter::new();
        let manager = AttributeManager::new(&sys, &reporter);

        let err = manager.create().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AllocationFailure);
        assert_eq!(err.errno(), libc::ENOMEM);
        assert_eq!(sys.calls(FaultPoint::AttrInit), 0);
        let records = reporter.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context, CREATE);
        assert_eq!(records[0].errno, libc::ENOMEM);
    }

    #[test]
    fn init_failure_frees_memory_without_destroy() {
        let sys = FaultSys::new();
        sys.arm(FaultPoint::AttrInit, libc::EAGAIN);
        let reporter = MemoryReporter::new();
        let manager = AttributeManager::new(&sys, &reporter);

        let err = manager.create().unwrap_err();
        assert_eq!(
            err,
            ThreadError::AttributeInit {
                stage: AttrStage::Init,
                errno: libc::EAGAIN
            }
        );
        assert_eq!(sys.live_attrs(), 0);
        assert_eq!(sys.calls(FaultPoint::AttrSetDetachState), 0);
        assert_eq!(sys.calls(FaultPoint::AttrDestroy), 0);
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn detach_state_failure_destroys_partial_attribute() {
        let sys = FaultSys::new();
        sys.arm(FaultPoint::AttrSetDetachState, libc::EINVAL);
        let reporter = MemoryReporter::new();
        let manager = AttributeManager::new(&sys, &reporter);

        let err = manager.create().unwrap_err();
        assert_eq!(
            err,
            ThreadError::AttributeInit {
                stage: AttrStage::SetDetachState,
                errno: libc::EINVAL
            }
        );
        assert_eq!(sys.calls(FaultPoint::AttrDestroy), 1);
        assert_eq!(sys.live_attrs(), 0);
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn destroy_failure_still_frees_memory() {
        let sys = FaultSys::new();
        let reporter = MemoryReporter::new();
        let manager = AttributeManager::new(&sys, &reporter);

        let attr = manager.create().expect("attribute");
        sys.arm(FaultPoint::AttrDestroy, libc::EBUSY);
        let err = attr.destroy().unwrap_err();
        assert_eq!(err, ThreadError::AttributeDestroy { errno: libc::EBUSY });
        assert_eq!(sys.live_attrs(), 0);
        let records = reporter.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context, DESTROY);
    }

    #[test]
    fn drop_destroys_and_reports_failures() {
        let sys = FaultSys::new();
        let reporter = MemoryReporter::new();
        let manager = AttributeManager::new(&sys, &reporter);

        drop(manager.create().expect("attribute"));
        assert_eq!(sys.live_attrs(), 0);
        assert!(reporter.is_empty());

        let attr = manager.create().expect("attribute");
        sys.arm(FaultPoint::AttrDestroy, libc::EBUSY);
        drop(attr);
        assert_eq!(sys.live_attrs(), 0);
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn raw_round_trip_and_null_destroy() {
        let sys = FaultSys::new();
        let reporter = MemoryReporter::new();
        let manager = AttributeManager::new(&sys, &reporter);

        let raw = manager.create().expect("attribute").into_raw();
        assert!(!raw.is_null());
        assert_eq!(sys.live_attrs(), 1);
        // SAFETY: raw came from into_raw above.
        unsafe { manager.destroy_raw(raw) }.expect("destroy");
        assert_eq!(sys.live_attrs(), 0);

        // SAFETY: null is explicitly allowed.
        let err = unsafe { manager.destroy_raw(std::ptr::null_mut()) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NullArgument);
        assert_eq!(err.errno(), 0);
        assert_eq!(sys.calls(FaultPoint::AttrDestroy), 1);
        let records = reporter.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].errno, 0);
    }
}
