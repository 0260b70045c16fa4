//! Per-request session lifecycle.
//!
//! For each request the manager moves a session through four states:
//!
//! 1. **Unresolved**: nothing cached for the request yet.
//! 2. **Cached**: [`SessionManager::resolve`] found the session in the
//!    request cache, or read the cookie and fetched it from the store.
//! 3. **Mutated**: application code changed the session through its
//!    [`SessionHandle`]. The manager does not intercept individual changes.
//! 4. **Finalized**: [`SessionManager::save`] persisted a non-empty session
//!    with a refreshed expiry, or chose to clear the cookie for an empty one.
//!    The cache entry is always dropped.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, TimeDelta, Utc};
use cookie::Cookie;
use satchel_session::{Session, SessionStore};
use tracing::{debug, trace};

use crate::cache::{RequestCache, RequestId, SessionHandle};
use crate::config::SessionConfig;
use crate::cookie as session_cookie;
use crate::error::Result;

/// Coordinates the request cache, the durable store and the session cookie.
///
/// Cheap to clone; clones share the same store and cache.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: RequestCache,
    config: Arc<SessionConfig>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("in_flight", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager over `store`.
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            cache: RequestCache::new(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    /// The session id presented in the request's cookie, or `""` if none.
    pub fn session_id(&self, headers: &HeaderMap) -> String {
        session_cookie::session_id(headers, &self.config.cookie_name)
    }

    /// Resolve the session for `request`.
    ///
    /// A cached entry is returned without touching the store. Otherwise the
    /// cookie's id is fetched from the store (an unknown or missing id yields
    /// a fresh session) and the result is cached for the request.
    pub async fn resolve(&self, request: RequestId, headers: &HeaderMap) -> Result<SessionHandle> {
        if let Some(handle) = self.cache.get(request) {
            trace!(request_id = %request, "Session found in request cache");
            return Ok(handle);
        }

        let id = self.session_id(headers);
        let session = self.store.get(&id).await?;

        debug!(
            request_id = %request,
            session_id = %session.id(),
            presented = !id.is_empty(),
            restored = session.id() == id,
            "Session resolved"
        );

        let handle = SessionHandle::new(session);
        self.cache.set(request, handle.clone());
        Ok(handle)
    }

    /// The session cached for `request`, without consulting the store.
    pub fn session(&self, request: RequestId) -> Option<SessionHandle> {
        self.cache.get(request)
    }

    /// Cache `session` for `request`, replacing any existing entry.
    pub fn cache_session(&self, request: RequestId, session: SessionHandle) {
        self.cache.set(request, session);
    }

    /// Write the session cached for `request` to the store as it stands.
    ///
    /// Does nothing if the request has no cached session.
    pub async fn persist(&self, request: RequestId) -> Result<()> {
        let Some(handle) = self.cache.get(request) else {
            trace!(request_id = %request, "No session to persist");
            return Ok(());
        };
        let session = handle.snapshot();
        self.store.set(&session).await?;
        Ok(())
    }

    /// The cookie expressing `session` as of `now`.
    pub fn session_cookie(&self, session: &Session, now: DateTime<Utc>) -> Cookie<'static> {
        session_cookie::session_cookie(&self.config, session, now)
    }

    /// Finalize `request`.
    ///
    /// Returns `None` if the request never resolved a session. A session
    /// holding values gets its expiry bumped to `now + idle_timeout`, is
    /// written to the store, and yields a cookie carrying its id. An empty
    /// session is not written and yields a removal cookie.
    ///
    /// The cache entry is dropped whatever the outcome.
    pub async fn save(
        &self,
        request: RequestId,
        now: DateTime<Utc>,
    ) -> Result<Option<Cookie<'static>>> {
        let result = self.finalize(request, now).await;
        self.clear(request);
        result
    }

    async fn finalize(
        &self,
        request: RequestId,
        now: DateTime<Utc>,
    ) -> Result<Option<Cookie<'static>>> {
        let Some(handle) = self.cache.get(request) else {
            return Ok(None);
        };

        let snapshot = {
            let mut session = handle.lock();
            if session.is_empty() {
                None
            } else {
                session.set_expiry(self.expiry_from(now));
                Some(session.clone())
            }
        };

        let Some(session) = snapshot else {
            debug!(request_id = %request, "Session empty, clearing cookie");
            return Ok(Some(session_cookie::removal_cookie(&self.config, now)));
        };

        self.store.set(&session).await?;

        debug!(
            request_id = %request,
            session_id = %session.id(),
            keys = session.len(),
            "Session saved"
        );

        Ok(Some(self.session_cookie(&session, now)))
    }

    /// Destroy the session of `request`.
    ///
    /// Deletes the durable record and purges the in-flight session, so the
    /// following [`save`](Self::save) clears the client's cookie.
    pub async fn destroy(&self, request: RequestId) -> Result<()> {
        let Some(handle) = self.cache.get(request) else {
            return Ok(());
        };

        let id = {
            let mut session = handle.lock();
            session.purge();
            session.id().to_string()
        };
        self.store.delete(&id).await?;

        debug!(request_id = %request, session_id = %id, "Session destroyed");
        Ok(())
    }

    /// Drop the cache entry for `request`.
    pub fn clear(&self, request: RequestId) {
        self.cache.delete(request);
    }

    /// `now + idle_timeout`, saturating at the latest representable instant.
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.config.idle_timeout)
            .ok()
            .and_then(|timeout| now.checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
