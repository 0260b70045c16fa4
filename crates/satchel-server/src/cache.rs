//! Request-scoped session cache.
//!
//! Maps the identity of an in-flight request to the session resolved for it,
//! so the store is consulted at most once per request. Entries live only
//! between resolve and finalize; the cache never holds more than one entry
//! per concurrently handled request.
//!
//! Request identity is an explicit [`RequestId`] minted by the session
//! middleware, never a value derived from the request (such as the cookie):
//! two concurrent requests presenting the same cookie get separate entries.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use satchel_session::Session;
use tracing::trace;
use uuid::Uuid;

/// Identity of one in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Mint a new request identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared, mutable reference to the session of one request.
///
/// Handlers mutate the session through [`SessionHandle::lock`]; the lifecycle
/// manager inspects the cumulative state when the request is finalized.
/// Guards must not be held across an `.await`.
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Lock the session for reading or mutation.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock()
    }

    pub fn id(&self) -> String {
        self.lock().id().to_string()
    }

    /// A copy of the current session state.
    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    /// Whether both handles point at the same session object.
    pub fn ptr_eq(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Cache of sessions keyed by request identity.
///
/// The lock guards insertion and removal only; it is never held while a
/// session's fields are mutated.
#[derive(Debug, Clone, Default)]
pub struct RequestCache {
    inner: Arc<RwLock<HashMap<RequestId, SessionHandle>>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session cached for `request`, or `None` on a miss.
    pub fn get(&self, request: RequestId) -> Option<SessionHandle> {
        self.inner.read().get(&request).cloned()
    }

    /// Insert or replace the session cached for `request`.
    pub fn set(&self, request: RequestId, session: SessionHandle) {
        let mut inner = self.inner.write();
        inner.insert(request, session);
        trace!(request_id = %request, cache_size = inner.len(), "Session cached for request");
    }

    /// Drop the entry for `request`. Dropping a missing entry is a no-op.
    pub fn delete(&self, request: RequestId) {
        if self.inner.write().remove(&request).is_some() {
            trace!(request_id = %request, "Session released from request cache");
        }
    }

    /// Number of in-flight requests holding a session.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
