//! Session and request-logging middleware.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::cache::RequestId;
use crate::cookie::to_header_value;
use crate::error::Result;
use crate::manager::SessionManager;
use crate::state::AppState;

/// Session middleware function.
///
/// Resolves the session for the request, exposes it to handlers as
/// [`Extension<SessionHandle>`](crate::SessionHandle) alongside the request's
/// [`RequestId`], then finalizes it once the handler returns.
///
/// Exactly one `Set-Cookie` header for the session is written: the cookie
/// produced by [`SessionManager::save`], or failing that the cookie computed
/// for the session as it was resolved. A failure to resolve or save yields a
/// 500 with no session cookie, and the request's cache entry is always
/// released.
pub async fn session_middleware(
    State(manager): State<SessionManager>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let request_id = RequestId::new();
    let response = run_with_session(&manager, request_id, request, next).await;
    manager.clear(request_id);

    response.unwrap_or_else(IntoResponse::into_response)
}

async fn run_with_session(
    manager: &SessionManager,
    request_id: RequestId,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let session = manager.resolve(request_id, request.headers()).await?;

    let initial = {
        let snapshot = session.lock();
        manager.session_cookie(&snapshot, Utc::now())
    };
    let initial = to_header_value(&initial)?;

    request.extensions_mut().insert(request_id);
    request.extensions_mut().insert(session);

    let mut response = next.run(request).await;

    let header = match manager.save(request_id, Utc::now()).await? {
        Some(cookie) => to_header_value(&cookie)?,
        None => initial,
    };
    set_cookie(&mut response, header);

    Ok(response)
}

fn set_cookie(response: &mut Response, value: HeaderValue) {
    response.headers_mut().append(SET_COOKIE, value);
}

/// Request logging middleware.
///
/// Logs method, path, status and duration for every request.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.request_logging {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}
