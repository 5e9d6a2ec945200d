use crate::{SessionData, SessionId};
use async_trait::async_trait;
use std::fmt::{Debug, Display};

/// This is the backend-facing interface of a session handle.
/// It defines the storage and locking operations the handle needs to materialize its state transitions.
///
/// A driver is responsible for mutual exclusion between handles of the same session id,
/// across requests and processes. The session handle only serializes the calls made through a
/// single handle.
///
/// Empty [`SessionData`] stands for a session that does not exist or has expired.
#[async_trait]
pub trait Driver: Send + Sync {
    /// The error type of the driver.
    type Error: Debug + Display + Send + Sync + 'static;

    /// Acquire the exclusive lock for `id`, and return the data currently stored under it.
    ///
    /// Must be safe to call concurrently for different ids.
    async fn open(&self, id: &SessionId) -> Result<SessionData, Self::Error>;

    /// Return the data currently stored under `id` without acquiring the lock.
    async fn read(&self, id: &SessionId) -> Result<SessionData, Self::Error>;

    /// Store `data` under `id`, expiring after `ttl_seconds`.
    /// A successful save releases the lock acquired by [`Driver::open`].
    async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
        ttl_seconds: u64,
    ) -> Result<(), Self::Error>;

    /// Release the lock for `id` without altering the stored data.
    async fn unlock(&self, id: &SessionId) -> Result<(), Self::Error>;

    /// Atomically move the session stored under `old_id` to `new_id`, preserving lock ownership.
    async fn regenerate(&self, old_id: &SessionId, new_id: &SessionId) -> Result<(), Self::Error>;
}
