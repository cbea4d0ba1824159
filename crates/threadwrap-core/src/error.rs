//! Error taxonomy for the attribute and thread lifecycle.
//!
//! Every variant carries the OS error code that caused it (`0` when the
//! failure is not OS-attributable, e.g. a null argument at the C boundary).

use std::fmt;

use thiserror::Error;

/// Which backing allocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Attribute,
    Handle,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Attribute => "thread attribute",
            Self::Handle => "thread handle",
        })
    }
}

/// Which step of attribute initialization failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrStage {
    /// `pthread_attr_init`.
    Init,
    /// `pthread_attr_setdetachstate(PTHREAD_CREATE_JOINABLE)`.
    SetDetachState,
}

impl fmt::Display for AttrStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::SetDetachState => "set_detach_state",
        })
    }
}

/// Fieldless discriminant of [`ThreadError`], convenient for matching and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AllocationFailure,
    AttributeInitFailure,
    AttributeDestroyFailure,
    AttributeTeardownFailure,
    AttributeCreationFailure,
    ThreadStartFailure,
    ThreadJoinFailure,
    NullArgument,
}

impl ErrorKind {
    /// Stable snake_case name used in structured records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllocationFailure => "allocation_failure",
            Self::AttributeInitFailure => "attribute_init_failure",
            Self::AttributeDestroyFailure => "attribute_destroy_failure",
            Self::AttributeTeardownFailure => "attribute_teardown_failure",
            Self::AttributeCreationFailure => "attribute_creation_failure",
            Self::ThreadStartFailure => "thread_start_failure",
            Self::ThreadJoinFailure => "thread_join_failure",
            Self::NullArgument => "null_argument",
        }
    }
}

/// Failure of an attribute or thread lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ThreadError {
    #[error("could not allocate memory for {resource} (errno {errno})")]
    Allocation { resource: Resource, errno: i32 },

    #[error("could not initialize thread attribute at {stage} (errno {errno})")]
    AttributeInit { stage: AttrStage, errno: i32 },

    #[error("could not destroy thread attribute (errno {errno})")]
    AttributeDestroy { errno: i32 },

    /// Attribute teardown failed after the thread had already started.
    #[error("thread started but its attribute could not be torn down (errno {errno})")]
    AttributeTeardown { errno: i32 },

    /// Step 1 of spawn failed; `cause` is the attribute manager's error.
    #[error("could not create thread attribute: {cause}")]
    AttributeCreation { cause: AttributeCause },

    #[error("could not start thread (errno {errno})")]
    ThreadStart { errno: i32 },

    #[error("could not join thread (errno {errno})")]
    ThreadJoin { errno: i32 },

    #[error("required {what} argument was null")]
    NullArgument { what: &'static str },
}

/// The attribute manager failure wrapped by [`ThreadError::AttributeCreation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttributeCause {
    #[error("allocation failed (errno {errno})")]
    Allocation { errno: i32 },
    #[error("{stage} failed (errno {errno})")]
    Init { stage: AttrStage, errno: i32 },
}

impl ThreadError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Allocation { .. } => ErrorKind::AllocationFailure,
            Self::AttributeInit { .. } => ErrorKind::AttributeInitFailure,
            Self::AttributeDestroy { .. } => ErrorKind::AttributeDestroyFailure,
            Self::AttributeTeardown { .. } => ErrorKind::AttributeTeardownFailure,
            Self::AttributeCreation { .. } => ErrorKind::AttributeCreationFailure,
            Self::ThreadStart { .. } => ErrorKind::ThreadStartFailure,
            Self::ThreadJoin { .. } => ErrorKind::ThreadJoinFailure,
            Self::NullArgument { .. } => ErrorKind::NullArgument,
        }
    }

    /// OS error code behind this failure, `0` if none.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match *self {
            Self::Allocation { errno, .. }
            | Self::AttributeInit { errno, .. }
            | Self::AttributeDestroy { errno }
            | Self::AttributeTeardown { errno }
            | Self::ThreadStart { errno }
            | Self::ThreadJoin { errno } => errno,
            Self::AttributeCreation { cause } => cause.errno(),
            Self::NullArgument { .. } => 0,
        }
    }

    /// Wrap an attribute manager failure as a spawn step-1 failure.
    ///
    /// Only `Allocation` and `AttributeInit` can come out of attribute
    /// creation; anything else is passed through unchanged.
    #[must_use]
    pub fn into_creation_failure(self) -> Self {
        match self {
            Self::Allocation { errno, .. } => Self::AttributeCreation {
                cause: AttributeCause::Allocation { errno },
            },
            Self::AttributeInit { stage, errno } => Self::AttributeCreation {
                cause: AttributeCause::Init { stage, errno },
            },
            other => other,
        }
    }
}

impl AttributeCause {
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match *self {
            Self::Allocation { errno } | Self::Init { errno, .. } => errno,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_errno_follow_variant() {
        let err = ThreadError::ThreadStart { errno: libc::EAGAIN };
        assert_eq!(err.kind(), ErrorKind::ThreadStartFailure);
        assert_eq!(err.errno(), libc::EAGAIN);

        let err = ThreadError::NullArgument { what: "handle" };
        assert_eq!(err.kind(), ErrorKind::NullArgument);
        assert_eq!(err.errno(), 0);
    }

    #[test]
    fn creation_failure_keeps_originating_errno() {
        let inner = ThreadError::AttributeInit {
            stage: AttrStage::SetDetachState,
            errno: libc::EINVAL,
        };
        let outer = inner.into_creation_failure();
        assert_eq!(outer.kind(), ErrorKind::AttributeCreationFailure);
        assert_eq!(outer.errno(), libc::EINVAL);
        assert_eq!(
            outer,
            ThreadError::AttributeCreation {
                cause: AttributeCause::Init {
                    stage: AttrStage::SetDetachState,
                    errno: libc::EINVAL,
                }
            }
        );

        let alloc = ThreadError::Allocation {
            resource: Resource::Attribute,
            errno: libc::ENOMEM,
        }
        .into_creation_failure();
        assert_eq!(alloc.errno(), libc::ENOMEM);
    }

    #[test]
    fn display_names_the_failing_step() {
        let err = ThreadError::AttributeInit {
            stage: AttrStage::SetDetachState,
            errno: 22,
        };
        assert_eq!(
            err.to_string(),
            "could not initialize thread attribute at set_detach_state (errno 22)"
        );
        let err = ThreadError::Allocation {
            resource: Resource::Handle,
            errno: 12,
        };
        assert!(err.to_string().contains("thread handle"));
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(ErrorKind::ThreadJoinFailure.as_str(), "thread_join_failure");
        assert_eq!(ErrorKind::NullArgument.as_str(), "null_argument");
    }
}
