//! HTTP session layer for Satchel.
//!
//! This crate ties a [`satchel_session::SessionStore`] to the request cycle:
//!
//! - [`RequestCache`]: sessions keyed by an explicit per-request [`RequestId`]
//! - [`SessionManager`]: resolve, persist, save, destroy and clear
//! - [`session_middleware`]: axum middleware wrapping a handler so every
//!   response carries exactly one session cookie
//! - [`Server`]: a router exposing the current session as a JSON API
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use satchel_server::{Server, ServerConfig, SessionConfig};
//! use satchel_session::SqliteStore;
//!
//! let store = Arc::new(SqliteStore::open("sessions.db")?);
//! let server = Server::new(store, SessionConfig::default(), ServerConfig::new());
//! server.run().await?;
//! ```

pub mod cache;
pub mod config;
pub mod cookie;
pub mod error;
pub mod manager;
pub mod middleware;
pub mod routes;
pub mod state;

pub use cache::{RequestCache, RequestId, SessionHandle};
pub use config::{ServerConfig, SessionConfig};
pub use error::{Result, ServerError};
pub use manager::SessionManager;
pub use middleware::{request_logging_middleware, session_middleware};
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use satchel_session::SessionStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Satchel HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server backed by `store`.
    pub fn new(store: Arc<dyn SessionStore>, session: SessionConfig, config: ServerConfig) -> Self {
        Self {
            state: AppState::new(store, session, config),
        }
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            // Health stays outside the session layer
            .merge(routes::health_routes())
            .nest("/api/v1", self.api_routes())
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                middleware::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// API routes (v1), all wrapped by the session middleware.
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post, put};

        Router::new()
            .route(
                "/session",
                get(routes::get_session_handler).delete(routes::purge_session_handler),
            )
            .route(
                "/session/{key}",
                put(routes::set_value_handler).delete(routes::delete_value_handler),
            )
            .route("/session/destroy", post(routes::destroy_session_handler))
            .layer(axum::middleware::from_fn_with_state(
                self.state.sessions.clone(),
                middleware::session_middleware,
            ))
    }

    /// Run the server on the configured address.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let router = self.router();

        if let Ok(addr) = listener.local_addr() {
            info!("Starting server on {}", addr);
        }

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{
            Request, StatusCode,
            header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        },
        response::Response,
    };
    use satchel_session::MemoryStore;
    use tower::ServiceExt;

    fn create_server() -> (Server, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let server = Server::new(
            store.clone(),
            SessionConfig::default(),
            ServerConfig::new().with_request_logging(false),
        );
        (server, store)
    }

    fn session_cookie(response: &Response) -> Option<String> {
        response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn put_value(key: &str, value: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("PUT")
            .uri(format!("/api/v1/session/{key}"))
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::from(value.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_has_no_session_cookie() {
        let (server, _store) = create_server();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_set_then_read_value() {
        let (server, store) = create_server();

        let response = server
            .router()
            .oneshot(put_value("theme", r#""dark""#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response).unwrap();
        assert_eq!(store.len().await.unwrap(), 1);

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/session")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let view = json_body(response).await;
        assert_eq!(view["values"]["theme"], "dark");
        assert_eq!(format!("session={}", view["id"].as_str().unwrap()), cookie);
        assert!(view["expires"].is_string());
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_noop() {
        let (server, store) = create_server();

        let response = server
            .router()
            .oneshot(put_value("theme", r#""dark""#, None))
            .await
            .unwrap();
        let cookie = session_cookie(&response).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/session/nope")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(session_cookie(&response), Some(cookie.clone()));

        let id = cookie.trim_start_matches("session=");
        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.get::<String>("theme").unwrap().as_deref(), Some("dark"));
    }

    #[tokio::test]
    async fn test_put_view_shows_expiry_from_before_the_request() {
        let (server, store) = create_server();

        let response = server
            .router()
            .oneshot(put_value("theme", r#""dark""#, None))
            .await
            .unwrap();
        let cookie = session_cookie(&response).unwrap();
        let view = json_body(response).await;

        // A brand-new session has never been saved
        assert!(view["expires"].is_null());

        let id = cookie.trim_start_matches("session=");
        let saved = store.get(id).await.unwrap().expiry().unwrap();

        let response = server
            .router()
            .oneshot(put_value("font", r#""mono""#, Some(&cookie)))
            .await
            .unwrap();
        let view = json_body(response).await;

        let shown: chrono::DateTime<chrono::Utc> =
            serde_json::from_value(view["expires"].clone()).unwrap();
        assert_eq!(shown, saved);
        assert!(store.get(id).await.unwrap().expiry().unwrap() >= saved);
    }

    #[tokio::test]
    async fn test_purge_clears_cookie() {
        let (server, _store) = create_server();

        let response = server
            .router()
            .oneshot(put_value("k", "1", None))
            .await
            .unwrap();
        let cookie = session_cookie(&response).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/session")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(session_cookie(&response).as_deref(), Some("session="));
    }

    #[tokio::test]
    async fn test_destroy_removes_record() {
        let (server, store) = create_server();

        let response = server
            .router()
            .oneshot(put_value("k", "1", None))
            .await
            .unwrap();
        let cookie = session_cookie(&response).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/session/destroy")
                    .header(COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(session_cookie(&response).as_deref(), Some("session="));
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[test]
    fn test_bind_address() {
        let store = Arc::new(MemoryStore::new());
        let server = Server::new(
            store,
            SessionConfig::default(),
            ServerConfig::new().with_bind_address("0.0.0.0:9000".parse().unwrap()),
        );
        assert_eq!(server.bind_address().port(), 9000);
    }
}
