use crate::error::{Error, Result};
use crate::{IdGenerator, RandomIdGenerator};
use crate::{Driver, IdBinding, RequestContext, SessionData, SessionId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display, Formatter};

/// The session of a single request.
///
/// A session handle coordinates access to the session data stored by a [`Driver`].
/// Data can be read while the handle is not waiting for the driver, and written only while the
/// session is locked:
///
/// ```text
///  Unlocked --open--> Locked --save/destroy/unlock--> Unlocked
/// ```
///
/// Every operation that touches the driver passes through [`LockState::Pending`] while it waits
/// for the driver's answer, and leaves it on success and on failure alike.
///
/// The handle must be back in [`LockState::Unlocked`] before it goes out of scope.
/// Use [`SessionHandle::close`] to check this explicitly; dropping a handle that still holds
/// its lock is reported as a [`Error::ResourceLeak`] (and panics in debug builds).
///
/// The id of the session is allocated lazily, on the first save of non-empty data.
/// Every change of the id is published to the [`RequestContext`] for the response layer.
#[must_use]
pub struct SessionHandle<'request, D: Driver, G: IdGenerator = RandomIdGenerator> {
    context: &'request mut RequestContext<D>,
    id_generator: G,
    id: IdBinding,
    data: SessionData,
    lock_state: LockState,
    closed: bool,
}

/// The lock state of a [`SessionHandle`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum LockState {
    /// The session is not locked. Its data can be read, but not written.
    #[default]
    Unlocked,
    /// The session is locked by this handle. Its data can be read and written.
    Locked,
    /// The handle is waiting for an answer from the driver.
    /// Its data can neither be read nor written.
    ///
    /// A handle only remains in this state if an operation was abandoned before the driver answered,
    /// e.g. because its future was dropped. [`SessionHandle::unlock`] recovers from it.
    Pending,
}

impl Display for LockState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlocked => write!(f, "not locked"),
            Self::Locked => write!(f, "locked"),
            Self::Pending => write!(f, "waiting for the session driver"),
        }
    }
}

impl<'request, D: Driver, G: IdGenerator + Default> SessionHandle<'request, D, G> {
    /// Create the session handle of a request.
    ///
    /// `inbound_token` is the session token sent by the client, if any. It is only bound if it is
    /// a syntactically valid [`SessionId`], otherwise the client is treated as a new visitor.
    pub fn new(context: &'request mut RequestContext<D>, inbound_token: Option<&str>) -> Self {
        Self::new_with_id_generator(context, inbound_token, G::default())
    }
}

impl<'request, D: Driver, G: IdGenerator> SessionHandle<'request, D, G> {
    /// Create the session handle of a request, generating new session ids with the given generator.
    pub fn new_with_id_generator(
        context: &'request mut RequestContext<D>,
        inbound_token: Option<&str>,
        id_generator: G,
    ) -> Self {
        Self {
            context,
            id_generator,
            id: IdBinding::from_inbound_token(inbound_token),
            data: SessionData::new(),
            lock_state: LockState::Unlocked,
            closed: false,
        }
    }

    /// Returns the current id binding of this session.
    pub fn id(&self) -> &IdBinding {
        &self.id
    }

    /// Returns the lock state of this session.
    pub fn lock_state(&self) -> LockState {
        self.lock_state
    }

    /// Returns true if this handle holds the session lock.
    pub fn is_locked(&self) -> bool {
        self.lock_state == LockState::Locked
    }

    /// Returns the request context of this session.
    pub fn context(&self) -> &RequestContext<D> {
        &*self.context
    }

    /// Lock the session and load its data.
    ///
    /// If no id is bound, the session is locked immediately with empty data.
    /// Otherwise the driver acquires its lock and returns the stored data.
    /// If the stored data is empty, the id is expired.
    ///
    /// Fails with [`Error::LockState`] unless the session is unlocked.
    /// If the driver fails, the session stays unlocked.
    pub async fn open(&mut self) -> Result<&mut Self, D::Error> {
        self.expect_lock_state("open", LockState::Unlocked)?;

        let Some(id) = self.id.bound().cloned() else {
            self.data.clear();
            self.lock_state = LockState::Locked;
            log::debug!("Locked session without id");
            return Ok(self);
        };

        self.lock_state = LockState::Pending;
        let opened = self.context.driver.open(&id).await;
        match opened {
            Ok(data) => {
                self.replace_data(data);
                self.lock_state = LockState::Locked;
                log::debug!("Locked session {id:?}");
                Ok(self)
            }
            Err(error) => {
                self.lock_state = LockState::Unlocked;
                Err(error.into())
            }
        }
    }

    /// Load the data of the session without locking it.
    ///
    /// Fails with [`Error::LockState`] unless the session is unlocked, as reading while locked
    /// would discard unsaved changes.
    pub async fn read(&mut self) -> Result<&mut Self, D::Error> {
        self.expect_lock_state("read", LockState::Unlocked)?;

        let Some(id) = self.id.bound().cloned() else {
            self.data.clear();
            return Ok(self);
        };

        let data = self.context.driver.read(&id).await?;
        self.replace_data(data);
        Ok(self)
    }

    /// Store the data of the session and unlock it.
    ///
    /// Saving empty data destroys the session, see [`SessionHandle::destroy`].
    /// If no id is bound yet, a new one is generated.
    ///
    /// If the driver fails to save, the data is read back from the driver, such that it matches
    /// what the driver actually holds, and the save error is returned.
    /// If reading back fails as well, the data is cleared and the read error is returned.
    /// An id generated by this save is expired in both cases, as the driver never stored it.
    /// In every case, the session is unlocked afterwards.
    pub async fn save(&mut self) -> Result<&mut Self, D::Error> {
        self.expect_lock_state("save", LockState::Locked)?;

        if self.data.is_empty() {
            return self.destroy().await;
        }

        let (id, generated) = match self.id.bound().cloned() {
            Some(id) => (id, false),
            None => {
                let id = self.id_generator.generate_id();
                self.bind(IdBinding::Bound(id.clone()));
                (id, true)
            }
        };
        let ttl = self.context.config.effective_ttl();

        self.lock_state = LockState::Pending;
        let saved = self.context.driver.save(&id, &self.data, ttl).await;
        let save_error = match saved {
            Ok(()) => {
                self.context.persisted_ttl = Some(ttl);
                self.lock_state = LockState::Unlocked;
                log::debug!("Saved session {id:?} for {ttl} seconds");
                return Ok(self);
            }
            Err(error) => error,
        };

        log::warn!("Failed to save session {id:?}, reading it back: {save_error}");
        let recovered = self.context.driver.read(&id).await;
        self.lock_state = LockState::Unlocked;
        match recovered {
            Ok(data) => {
                self.replace_data(data);
                Err(save_error.into())
            }
            Err(read_error) => {
                self.data.clear();
                if generated {
                    self.bind(IdBinding::Expired);
                }
                Err(read_error.into())
            }
        }
    }

    /// Clear the session and unlock it.
    ///
    /// The id is expired, and the driver stores empty data under it, such that holders of the old
    /// id observe an empty session. Does not contact the driver if no id is bound.
    pub async fn destroy(&mut self) -> Result<&mut Self, D::Error> {
        self.expect_lock_state("destroy", LockState::Locked)?;

        self.data.clear();
        let Some(id) = self.id.bound().cloned() else {
            self.lock_state = LockState::Unlocked;
            return Ok(self);
        };

        self.bind(IdBinding::Expired);
        let ttl = self.context.config.effective_ttl();

        self.lock_state = LockState::Pending;
        let result = self
            .context
            .driver
            .save(&id, &SessionData::new(), ttl)
            .await;
        self.lock_state = LockState::Unlocked;
        result?;

        log::debug!("Destroyed session {id:?}");
        Ok(self)
    }

    /// Release the lock without saving, discarding all changes.
    ///
    /// The data is cleared right away. If an id is bound, the driver releases its lock and the
    /// data is read back from the driver. If this fails, the data stays empty and the error is
    /// returned. In every case, the session is unlocked afterwards.
    ///
    /// This is also the way out of [`LockState::Pending`] after an abandoned operation.
    /// Fails with [`Error::LockState`] if the session is already unlocked.
    pub async fn unlock(&mut self) -> Result<&mut Self, D::Error> {
        if self.lock_state == LockState::Unlocked {
            return Err(self.lock_state_error("unlock"));
        }

        self.data.clear();
        let Some(id) = self.id.bound().cloned() else {
            self.lock_state = LockState::Unlocked;
            return Ok(self);
        };

        self.lock_state = LockState::Pending;
        let refreshed = unlock_and_read(&self.context.driver, &id).await;
        self.lock_state = LockState::Unlocked;

        let data = refreshed?;
        self.replace_data(data);
        log::debug!("Unlocked session {id:?}");
        Ok(self)
    }

    /// Replace the id of the session by a freshly generated one, keeping its data and lock.
    ///
    /// The new id is only bound after the driver moved the session. If the driver fails, the old
    /// id stays bound. Does nothing if no id is bound, as the id is generated on the first save anyway.
    pub async fn regenerate(&mut self) -> Result<&mut Self, D::Error> {
        self.expect_lock_state("regenerate", LockState::Locked)?;

        let Some(old_id) = self.id.bound().cloned() else {
            return Ok(self);
        };
        let new_id = self.id_generator.generate_id();
        self.context.driver.regenerate(&old_id, &new_id).await?;

        log::debug!("Regenerated session {old_id:?} as {new_id:?}");
        self.bind(IdBinding::Bound(new_id));
        Ok(self)
    }

    /// Returns true if the session contains `key`.
    pub fn has(&self, key: &str) -> Result<bool, D::Error> {
        self.expect_readable("read")?;
        Ok(self.data.contains_key(key))
    }

    /// Returns the value stored under `key`, converted to `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, D::Error> {
        self.expect_readable("read")?;
        self.data
            .get(key)
            .map(|value| {
                T::deserialize(value).map_err(|source| Error::Value {
                    key: key.to_owned(),
                    source,
                })
            })
            .transpose()
    }

    /// Returns true if the session contains no data.
    pub fn is_empty(&self) -> Result<bool, D::Error> {
        self.expect_readable("read")?;
        Ok(self.data.is_empty())
    }

    /// Store `value` under `key`.
    ///
    /// Fails with [`Error::LockState`] unless the session is locked.
    pub fn set<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<&mut Self, D::Error> {
        self.expect_lock_state("write", LockState::Locked)?;
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.insert(key, value);
                Ok(self)
            }
            Err(source) => Err(Error::Value { key, source }),
        }
    }

    /// Remove the value stored under `key`, if any.
    ///
    /// Fails with [`Error::LockState`] unless the session is locked.
    pub fn unset(&mut self, key: &str) -> Result<&mut Self, D::Error> {
        self.expect_lock_state("write", LockState::Locked)?;
        self.data.remove(key);
        Ok(self)
    }

    /// Consume the handle, checking that it released its lock.
    ///
    /// Returns [`Error::ResourceLeak`] if the handle is not unlocked.
    pub fn close(mut self) -> Result<(), D::Error> {
        self.closed = true;
        match self.lock_state {
            LockState::Unlocked => Ok(()),
            state => {
                log::error!("Closed session handle while {state}");
                Err(Error::ResourceLeak { state })
            }
        }
    }

    fn bind(&mut self, id: IdBinding) {
        self.context.publish_id(&id);
        self.id = id;
    }

    fn replace_data(&mut self, data: SessionData) {
        if data.is_empty() && self.id.is_bound() {
            log::debug!("Session {:?} has no data, expiring its id", self.id);
            self.bind(IdBinding::Expired);
        }
        self.data = data;
    }

    fn expect_lock_state(
        &self,
        operation: &'static str,
        expected: LockState,
    ) -> Result<(), D::Error> {
        if self.lock_state == expected {
            Ok(())
        } else {
            Err(self.lock_state_error(operation))
        }
    }

    fn expect_readable(&self, operation: &'static str) -> Result<(), D::Error> {
        if self.lock_state == LockState::Pending {
            Err(self.lock_state_error(operation))
        } else {
            Ok(())
        }
    }

    fn lock_state_error(&self, operation: &'static str) -> Error<D::Error> {
        Error::LockState {
            operation,
            state: self.lock_state,
        }
    }
}

async fn unlock_and_read<D: Driver>(
    driver: &D,
    id: &SessionId,
) -> std::result::Result<SessionData, D::Error> {
    driver.unlock(id).await?;
    driver.read(id).await
}

impl<D: Driver, G: IdGenerator> Drop for SessionHandle<'_, D, G> {
    fn drop(&mut self) {
        if self.closed || self.lock_state == LockState::Unlocked {
            return;
        }

        let error = Error::<D::Error>::ResourceLeak {
            state: self.lock_state,
        };
        log::error!("{error}");
        if cfg!(debug_assertions) && !std::thread::panicking() {
            panic!("{error}");
        }
    }
}

impl<D: Driver, G: IdGenerator> Debug for SessionHandle<'_, D, G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("lock_state", &self.lock_state)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
