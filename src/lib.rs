//! Async HTTP sessions with explicit locking.
//!
//! This crate provides a per-request [`SessionHandle`] that coordinates exclusive, ordered
//! access to session data kept by a pluggable [`Driver`]. The handle tracks whether the
//! session is unlocked, locked, or waiting for the driver, and only allows writes while the
//! session is locked. Mutual exclusion between requests is the responsibility of the driver.
//!
//! # Lifecycle
//!
//! A handle is created for every request from the session token sent by the client, if any.
//! The request then [`open`](SessionHandle::open)s the session, reads and writes its data, and
//! ends with [`save`](SessionHandle::save), [`destroy`](SessionHandle::destroy) or
//! [`unlock`](SessionHandle::unlock). A handle that still holds its lock when it goes out of
//! scope is a bug in the caller and reported as [`Error::ResourceLeak`].
//!
//! Session ids are generated lazily on the first save of non-empty data. Whenever the id
//! changes, the [`RequestContext`] receives a [`SessionCookieCommand`] for the response.
//!
//! # Failures
//!
//! Errors of the driver are passed to the caller, but the handle never stays waiting for the
//! driver after a failure. If a save fails, the handle reads the session back from the driver,
//! such that its data matches what the driver actually stores.
//!
//! # Example
//!
//! ```
//! use locking_session::{
//!     MemoryDriver, RequestContext, SessionConfig, SessionCookieCommand, SessionHandle,
//! };
//!
//! # fn main() -> Result<(), locking_session::Error<locking_session::MemoryDriverError>> {
//! # async_std::task::block_on(async {
//! #
//! let driver = MemoryDriver::new();
//!
//! // First request: a new visitor stores a value.
//! let mut context = RequestContext::new(driver.clone(), SessionConfig::new());
//! let mut session: SessionHandle<_> = SessionHandle::new(&mut context, None);
//! session.open().await?.set("visits", 1)?;
//! session.save().await?;
//! session.close()?;
//! let SessionCookieCommand::Set { value, .. } = context.into_cookie_command() else {
//!     unreachable!("The first save of non-empty data binds a new id")
//! };
//!
//! // Second request: the client sends the cookie back.
//! let mut context = RequestContext::new(driver, SessionConfig::new());
//! let mut session: SessionHandle<_> = SessionHandle::new(&mut context, Some(&value));
//! session.open().await?;
//! assert_eq!(session.get::<i32>("visits")?, Some(1));
//! session.unlock().await?;
//! session.close()?;
//! #
//! # Ok(()) }) }
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

mod config;
mod context;
mod driver;
mod error;
mod memory_driver;
mod session;
mod session_data;
mod session_id;

pub use config::{SessionConfig, SessionTtl, DEFAULT_MAXLIFE};
pub use context::{RequestContext, SessionCookieCommand};
pub use driver::Driver;
pub use error::{Error, InvalidTtl, Result};
pub use memory_driver::{DriverOperation, MemoryDriver, MemoryDriverError};
pub use session::{LockState, SessionHandle};
pub use session_data::SessionData;
pub use session_id::generator::{DebugIdGenerator, IdGenerator, RandomIdGenerator};
pub use session_id::{IdBinding, SessionId, StorageKey, ID_BYTES, ID_LENGTH};
