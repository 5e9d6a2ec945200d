use crate::session::LockState;

/// All errors that can occur in this crate.
///
/// `DriverError` is the error type of the [`Driver`](crate::Driver) the session handle talks to.
#[derive(Debug, thiserror::Error)]
#[allow(missing_copy_implementations)]
pub enum Error<DriverError> {
    /// An operation was invoked while the handle was in a lock state that does not permit it.
    /// This is always a mistake of the caller and is never retried.
    ///
    /// If `state` is [`LockState::Pending`], a previous operation was abandoned before the driver
    /// answered. Otherwise the caller forgot to [`open`](crate::SessionHandle::open) the session,
    /// or opened it twice.
    #[error("cannot {operation} while the session is {state}")]
    LockState {
        /// The operation that was rejected.
        operation: &'static str,
        /// The lock state of the handle at the time of the call.
        state: LockState,
    },

    /// A session handle went out of scope without releasing its lock.
    /// Every request must end with [`save`](crate::SessionHandle::save),
    /// [`destroy`](crate::SessionHandle::destroy) or [`unlock`](crate::SessionHandle::unlock).
    #[error("session handle released while still {state}, call save, destroy or unlock before the request ends")]
    ResourceLeak {
        /// The lock state the handle was left in.
        state: LockState,
    },

    /// A session value could not be converted to or from the requested type.
    #[error("the session value under key {key:?} could not be converted: {source}")]
    Value {
        /// The key of the offending value.
        key: String,
        /// The underlying conversion error.
        source: serde_json::Error,
    },

    /// An error occurred in the session driver.
    #[error("{0}")]
    Driver(DriverError),
}

impl<DriverError> Error<DriverError> {
    /// Returns the lock state that caused this error, if it is a [`Error::LockState`] error.
    ///
    /// Callers use this to tell a handle that was never locked ([`LockState::Unlocked`]) apart
    /// from one whose lock acquisition is still in flight ([`LockState::Pending`]).
    pub fn lock_state(&self) -> Option<LockState> {
        match self {
            Self::LockState { state, .. } => Some(*state),
            _ => None,
        }
    }

    /// Returns true if this error was raised by the session driver.
    pub fn is_driver_error(&self) -> bool {
        matches!(self, Self::Driver(_))
    }
}

impl<DriverError> From<DriverError> for Error<DriverError> {
    fn from(error: DriverError) -> Self {
        Self::Driver(error)
    }
}

/// A result whose error type is [`Error`] over the given driver error.
pub type Result<T, DriverError> = std::result::Result<T, Error<DriverError>>;

/// A session ttl was neither `-1` nor a non-negative number of seconds.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("invalid session ttl {0}, expected -1 or a non-negative number of seconds")]
pub struct InvalidTtl(pub i64);

mod expect_impl_error {
    trait ExpectImplError: std::error::Error {}

    impl<DriverError: std::error::Error> ExpectImplError for super::Error<DriverError> {}
}
