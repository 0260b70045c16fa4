//! The store contract that backing engines implement.
//!
//! The lifecycle manager depends only on [`SessionStore`], so engines are
//! interchangeable. "Not found" is never an error here: an unknown or empty
//! id resolves to a fresh, empty [`Session`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::session::Session;

/// Durable storage for encoded sessions, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session stored under `id`.
    ///
    /// An empty or unknown id yields a freshly minted empty session. A record
    /// that fails to decode is deleted and also yields a fresh session.
    async fn get(&self, id: &str) -> Result<Session>;

    /// Upsert `session` under its own id.
    async fn set(&self, session: &Session) -> Result<()>;

    /// Delete the record under `id`. Deleting an unknown id is a no-op.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Every stored session. Records that fail to decode are removed and
    /// skipped.
    async fn all(&self) -> Result<Vec<Session>>;

    /// Number of stored sessions.
    async fn len(&self) -> Result<usize> {
        Ok(self.all().await?.len())
    }
}

/// Delete every stored session that has expired at `now`.
///
/// Sessions with no expiry are treated as expired. Returns the number of
/// records removed.
pub async fn prune_expired(store: &dyn SessionStore, now: DateTime<Utc>) -> Result<usize> {
    let mut removed = 0;
    for session in store.all().await? {
        if session.is_expired_at(now) {
            debug!(session_id = %session.id(), "Pruning expired session");
            store.delete(session.id()).await?;
            removed += 1;
        }
    }

    if removed > 0 {
        info!(count = removed, "Pruned expired sessions");
    }

    Ok(removed)
}
