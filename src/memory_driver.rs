use crate::{Driver, SessionData, SessionId, StorageKey};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// # in-memory session driver
/// Because there is no external
/// persistence, this driver is ephemeral and will be cleared
/// on server restart.
///
/// Clones of a memory driver share the same sessions, so one driver can be handed to every request.
/// Locks are only exclusive within the process. Opening a session that is locked by another handle
/// fails immediately with [`MemoryDriverError::AlreadyLocked`] instead of waiting.
/// Opening an id without live data does not lock it.
///
/// # ***READ THIS BEFORE USING IN A PRODUCTION DEPLOYMENT***
///
/// Storing sessions only in memory brings the following problems:
///
/// 1. All sessions must fit in available memory (important for high load services)
/// 2. Expired sessions are only removed from memory if [MemoryDriver::cleanup] or [MemoryDriver::clear] is called.
///    If sessions are not cleaned up properly it might result in OOM
/// 3. All sessions will be lost on shutdown
/// 4. If the service is clustered particular session will be stored only on a single instance.
///    This might be solved by using load balancers with sticky sessions.
///    Unfortunately, this solution brings additional complexity especially if the connection is
///    using secure transport since the load balancer has to perform SSL termination to understand
///    where should it forward packets to
///
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<StorageKey, Record>,
    locks: HashSet<StorageKey>,
    logger: Option<Vec<DriverOperation>>,
}

#[derive(Debug, Clone)]
struct Record {
    expires_at: DateTime<Utc>,
    data: SessionData,
}

/// A call made to a [`MemoryDriver`], as recorded by its logger.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum DriverOperation {
    Open {
        id: SessionId,
    },
    Read {
        id: SessionId,
    },
    Save {
        id: SessionId,
        data: SessionData,
        ttl_seconds: u64,
    },
    Unlock {
        id: SessionId,
    },
    Regenerate {
        old_id: SessionId,
        new_id: SessionId,
    },
}

/// The errors of the [`MemoryDriver`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum MemoryDriverError {
    /// The session is locked by another handle.
    #[error("the session is locked by another handle")]
    AlreadyLocked,
    /// The new id of a regenerated session already belongs to a live session.
    #[error("the new session id is already in use")]
    IdCollision,
}

#[async_trait]
impl Driver for MemoryDriver {
    type Error = MemoryDriverError;

    async fn open(&self, id: &SessionId) -> Result<SessionData, Self::Error> {
        let mut inner = self.lock_inner();
        inner.log(|| DriverOperation::Open { id: id.clone() });

        let key = id.storage_key();
        if inner.locks.contains(&key) {
            return Err(MemoryDriverError::AlreadyLocked);
        }

        // A handle abandons an id without data, so there is nothing to lock.
        let data = inner.live_data(&key, Utc::now());
        if !data.is_empty() {
            inner.locks.insert(key);
        }
        Ok(data)
    }

    async fn read(&self, id: &SessionId) -> Result<SessionData, Self::Error> {
        let mut inner = self.lock_inner();
        inner.log(|| DriverOperation::Read { id: id.clone() });
        Ok(inner.live_data(&id.storage_key(), Utc::now()))
    }

    async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
        ttl_seconds: u64,
    ) -> Result<(), Self::Error> {
        let mut inner = self.lock_inner();
        inner.log(|| DriverOperation::Save {
            id: id.clone(),
            data: data.clone(),
            ttl_seconds,
        });

        // Empty data is kept as a tombstone until it expires.
        let key = id.storage_key();
        inner.records.insert(
            key,
            Record {
                expires_at: expiry_after(Utc::now(), ttl_seconds),
                data: data.clone(),
            },
        );
        inner.locks.remove(&key);
        Ok(())
    }

    async fn unlock(&self, id: &SessionId) -> Result<(), Self::Error> {
        let mut inner = self.lock_inner();
        inner.log(|| DriverOperation::Unlock { id: id.clone() });
        inner.locks.remove(&id.storage_key());
        Ok(())
    }

    async fn regenerate(&self, old_id: &SessionId, new_id: &SessionId) -> Result<(), Self::Error> {
        let mut inner = self.lock_inner();
        inner.log(|| DriverOperation::Regenerate {
            old_id: old_id.clone(),
            new_id: new_id.clone(),
        });

        let now = Utc::now();
        let (old_key, new_key) = (old_id.storage_key(), new_id.storage_key());
        if inner.locks.contains(&new_key) || inner.is_live(&new_key, now) {
            return Err(MemoryDriverError::IdCollision);
        }

        if let Some(record) = inner.records.remove(&old_key) {
            inner.records.insert(new_key, record);
        }
        if inner.locks.remove(&old_key) {
            inner.locks.insert(new_key);
        }
        Ok(())
    }
}

impl MemoryDriver {
    /// Create a new empty memory driver.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a new empty memory driver that records every call made to it.
    /// This is intended for tests, see [`MemoryDriver::logged_operations`].
    pub fn new_with_logger() -> Self {
        let driver = Self::new();
        driver.lock_inner().logger = Some(Vec::new());
        driver
    }

    /// Returns the calls made to this driver, in order.
    /// Returns an empty list if this driver was not created with [`MemoryDriver::new_with_logger`].
    pub fn logged_operations(&self) -> Vec<DriverOperation> {
        self.lock_inner().logger.clone().unwrap_or_default()
    }

    /// Returns the number of stored sessions, including expired ones that were not cleaned up yet.
    pub fn len(&self) -> usize {
        self.lock_inner().records.len()
    }

    /// Returns true if no session is stored.
    pub fn is_empty(&self) -> bool {
        self.lock_inner().records.is_empty()
    }

    /// Returns true if the session with the given id is currently locked.
    pub fn is_locked(&self, id: &SessionId) -> bool {
        self.lock_inner().locks.contains(&id.storage_key())
    }

    /// Performs session cleanup. This should be run on an
    /// intermittent basis if this driver is run for long enough that
    /// memory accumulation is a concern.
    pub fn cleanup(&self) {
        log::trace!("Cleaning up memory driver...");
        let now = Utc::now();
        let mut inner = self.lock_inner();
        let initial_len = inner.records.len();
        inner.records.retain(|_, record| record.expires_at > now);
        log::trace!(
            "Deleted {} expired sessions",
            initial_len - inner.records.len()
        );
    }

    /// Empties the entire driver, deleting all sessions and releasing all locks.
    pub fn clear(&self) {
        let mut inner = self.lock_inner();
        inner.records.clear();
        inner.locks.clear();
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        // The guarded state stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn log(&mut self, operation: impl FnOnce() -> DriverOperation) {
        if let Some(logger) = self.logger.as_mut() {
            logger.push(operation());
        }
    }

    fn is_live(&self, key: &StorageKey, now: DateTime<Utc>) -> bool {
        self.records
            .get(key)
            .map_or(false, |record| record.expires_at > now)
    }

    fn live_data(&self, key: &StorageKey, now: DateTime<Utc>) -> SessionData {
        match self.records.get(key) {
            Some(record) if record.expires_at > now => record.data.clone(),
            _ => SessionData::new(),
        }
    }
}

fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    let seconds = u32::try_from(ttl_seconds).unwrap_or(u32::MAX);
    now + Duration::seconds(i64::from(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DebugIdGenerator, IdGenerator};
    use serde_json::json;

    fn data(value: i32) -> SessionData {
        [("value", json!(value))].into_iter().collect()
    }

    #[async_std::test]
    async fn test_open_locks_until_save() {
        let driver = MemoryDriver::new();
        let id = DebugIdGenerator::default().generate_id();

        assert_eq!(driver.open(&id).await, Ok(SessionData::new()));
        assert!(!driver.is_locked(&id));

        driver.save(&id, &data(1), 60).await.unwrap();
        assert_eq!(driver.open(&id).await, Ok(data(1)));
        assert!(driver.is_locked(&id));
        assert_eq!(
            driver.open(&id).await,
            Err(MemoryDriverError::AlreadyLocked)
        );
        // reading does not need the lock
        assert_eq!(driver.read(&id).await, Ok(data(1)));

        driver.save(&id, &data(2), 60).await.unwrap();
        assert!(!driver.is_locked(&id));
        assert_eq!(driver.open(&id).await, Ok(data(2)));
        driver.unlock(&id).await.unwrap();
        assert!(!driver.is_locked(&id));
    }

    #[async_std::test]
    async fn test_expired_sessions_are_empty_and_cleaned_up() {
        let driver = MemoryDriver::new();
        let mut generator = DebugIdGenerator::default();
        let (expired, live) = (generator.generate_id(), generator.generate_id());

        driver.save(&expired, &data(1), 0).await.unwrap();
        driver.save(&live, &data(2), 60).await.unwrap();
        assert_eq!(driver.len(), 2);
        assert_eq!(driver.read(&expired).await, Ok(SessionData::new()));
        assert_eq!(driver.read(&live).await, Ok(data(2)));

        driver.cleanup();
        assert_eq!(driver.len(), 1);
        driver.clear();
        assert!(driver.is_empty());
    }

    #[async_std::test]
    async fn test_regenerate_moves_record_and_lock() {
        let driver = MemoryDriver::new();
        let mut generator = DebugIdGenerator::default();
        let (old_id, new_id, other_id) = (
            generator.generate_id(),
            generator.generate_id(),
            generator.generate_id(),
        );
        driver.save(&old_id, &data(1), 60).await.unwrap();
        driver.save(&other_id, &data(2), 60).await.unwrap();
        driver.open(&old_id).await.unwrap();

        assert_eq!(
            driver.regenerate(&old_id, &other_id).await,
            Err(MemoryDriverError::IdCollision)
        );
        driver.regenerate(&old_id, &new_id).await.unwrap();
        assert!(!driver.is_locked(&old_id));
        assert!(driver.is_locked(&new_id));
        assert_eq!(driver.read(&old_id).await, Ok(SessionData::new()));
        assert_eq!(driver.read(&new_id).await, Ok(data(1)));
    }

    #[async_std::test]
    async fn test_logger() {
        let driver = MemoryDriver::new_with_logger();
        let id = DebugIdGenerator::default().generate_id();
        driver.read(&id).await.unwrap();
        driver.unlock(&id).await.unwrap();
        assert_eq!(
            driver.logged_operations(),
            [
                DriverOperation::Read { id: id.clone() },
                DriverOperation::Unlock { id }
            ]
        );
        assert!(MemoryDriver::new().logged_operations().is_empty());
    }
}
