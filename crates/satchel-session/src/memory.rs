//! In-process session store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::error::Result;
use crate::session::Session;
use crate::store::SessionStore;

/// Session store holding encoded records in memory.
///
/// Records are kept in their encoded form so the store honours the same
/// encode/decode contract as a durable engine. Contents are lost when the
/// store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write raw bytes under `id`, bypassing encoding.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, id: &str, bytes: Vec<u8>) {
        self.records.write().insert(id.to_string(), bytes);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Session> {
        let mut session = Session::new()?;
        if id.is_empty() {
            return Ok(session);
        }

        // Held across decode so a concurrent `set` cannot land between the
        // failed decode and the removal.
        let mut records = self.records.write();
        let Some(bytes) = records.get(id) else {
            trace!(session_id = %id, "No stored session, starting fresh");
            return Ok(session);
        };

        if let Err(e) = session.decode(bytes) {
            warn!(session_id = %id, error = %e, "Deleting broken session record");
            records.remove(id);
        }

        Ok(session)
    }

    async fn set(&self, session: &Session) -> Result<()> {
        let bytes = session.encode()?;
        self.records.write().insert(session.id().to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.write().remove(id);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Session>> {
        let mut records = self.records.write();
        let mut sessions = Vec::with_capacity(records.len());
        let mut broken = Vec::new();

        for (id, bytes) in records.iter() {
            match Session::from_bytes(bytes) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Deleting broken session record");
                    broken.push(id.clone());
                }
            }
        }

        for id in broken {
            records.remove(&id);
        }

        Ok(sessions)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}
