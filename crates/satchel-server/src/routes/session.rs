//! Session inspector endpoints.
//!
//! Every handler here runs under the session middleware and works on the
//! request's [`SessionHandle`]; none of them talk to the store directly
//! except `destroy`.

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::{RequestId, SessionHandle};
use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Current state of a session as seen by the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    /// Expiry as of the last save, `None` for a session never saved.
    ///
    /// Handlers run before this request's save, so the sliding expiry it
    /// writes (and the `Set-Cookie` carries) is not shown here.
    pub expires: Option<DateTime<Utc>>,
    pub values: HashMap<String, Value>,
}

impl SessionView {
    fn of(handle: &SessionHandle) -> Self {
        let session = handle.lock();
        Self {
            id: session.id().to_string(),
            expires: session.expiry(),
            values: session.values().clone(),
        }
    }
}

/// GET /api/v1/session
pub async fn get_session_handler(
    Extension(session): Extension<SessionHandle>,
) -> Json<SessionView> {
    Json(SessionView::of(&session))
}

/// PUT /api/v1/session/{key}
///
/// Responds with the session including the new value. Its `expires` is the
/// expiry before this request; the response cookie carries the renewed one.
pub async fn set_value_handler(
    Extension(session): Extension<SessionHandle>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<SessionView>> {
    if key.trim().is_empty() {
        return Err(ServerError::BadRequest("key must not be blank".to_string()));
    }

    session.lock().set_value(key.clone(), value);
    debug!(session_id = %session.id(), key = %key, "Session value set");

    Ok(Json(SessionView::of(&session)))
}

/// DELETE /api/v1/session/{key}
///
/// Deleting a key the session does not hold is a no-op.
pub async fn delete_value_handler(
    Extension(session): Extension<SessionHandle>,
    Path(key): Path<String>,
) -> StatusCode {
    session.lock().delete(&key);
    debug!(session_id = %session.id(), key = %key, "Session value deleted");
    StatusCode::NO_CONTENT
}

/// DELETE /api/v1/session
pub async fn purge_session_handler(Extension(session): Extension<SessionHandle>) -> StatusCode {
    session.lock().purge();
    StatusCode::NO_CONTENT
}

/// POST /api/v1/session/destroy
pub async fn destroy_session_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<StatusCode> {
    state.sessions.destroy(request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
