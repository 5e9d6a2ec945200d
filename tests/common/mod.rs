#![allow(dead_code)]

use async_trait::async_trait;
use locking_session::{Driver, MemoryDriver, SessionData, SessionId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A driver call that can be made to fail.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Fault {
    Open,
    /// `open` never answers.
    StallOpen,
    Read,
    /// `save` fails without writing anything.
    Save,
    /// `save` writes the data, but reports a failure anyway.
    SaveAfterWrite,
    Unlock,
    Regenerate,
}

/// Wraps a [`MemoryDriver`] and fails the calls selected with [`FaultyDriver::inject`].
#[derive(Debug, Clone, Default)]
pub struct FaultyDriver {
    inner: MemoryDriver,
    faults: Arc<Mutex<HashSet<Fault>>>,
}

impl FaultyDriver {
    pub fn new(inner: MemoryDriver) -> Self {
        Self {
            inner,
            faults: Default::default(),
        }
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().unwrap().insert(fault);
    }

    pub fn heal(&self) {
        self.faults.lock().unwrap().clear();
    }

    pub fn inner(&self) -> &MemoryDriver {
        &self.inner
    }

    fn check(&self, fault: Fault) -> anyhow::Result<()> {
        if self.faults.lock().unwrap().contains(&fault) {
            anyhow::bail!("injected {fault:?} failure");
        }
        Ok(())
    }

    fn is_injected(&self, fault: Fault) -> bool {
        self.faults.lock().unwrap().contains(&fault)
    }
}

#[async_trait]
impl Driver for FaultyDriver {
    type Error = anyhow::Error;

    async fn open(&self, id: &SessionId) -> anyhow::Result<SessionData> {
        if self.is_injected(Fault::StallOpen) {
            std::future::pending::<()>().await;
        }
        self.check(Fault::Open)?;
        Ok(self.inner.open(id).await?)
    }

    async fn read(&self, id: &SessionId) -> anyhow::Result<SessionData> {
        self.check(Fault::Read)?;
        Ok(self.inner.read(id).await?)
    }

    async fn save(
        &self,
        id: &SessionId,
        data: &SessionData,
        ttl_seconds: u64,
    ) -> anyhow::Result<()> {
        self.check(Fault::Save)?;
        self.inner.save(id, data, ttl_seconds).await?;
        self.check(Fault::SaveAfterWrite)
    }

    async fn unlock(&self, id: &SessionId) -> anyhow::Result<()> {
        self.check(Fault::Unlock)?;
        Ok(self.inner.unlock(id).await?)
    }

    async fn regenerate(&self, old_id: &SessionId, new_id: &SessionId) -> anyhow::Result<()> {
        self.check(Fault::Regenerate)?;
        Ok(self.inner.regenerate(old_id, new_id).await?)
    }
}
