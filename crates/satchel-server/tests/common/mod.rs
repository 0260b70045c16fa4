//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Response};
use tempfile::TempDir;
use tokio::sync::Barrier;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use satchel_server::{Server, ServerConfig, SessionConfig};
use satchel_session::{MemoryStore, Session, SessionStore, SqliteStore};

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    /// The store backing the server.
    pub store: Arc<dyn SessionStore>,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
    /// Temporary directory for the session database.
    pub temp_dir: TempDir,
}

impl TestServer {
    /// Start a test server backed by a SQLite store in a temp directory.
    pub async fn start() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let store = Arc::new(SqliteStore::open(temp_dir.path().join("sessions.db"))?);
        Self::start_with(store, SessionConfig::default(), temp_dir).await
    }

    /// Start a test server over `store` with `session` settings.
    pub async fn start_with(
        store: Arc<dyn SessionStore>,
        session: SessionConfig,
        temp_dir: TempDir,
    ) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_request_logging(false);

        let server = Server::new(store.clone(), session, config);
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            store,
            _handle: handle,
            temp_dir,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// GET with an optional `name=value` cookie pair.
    pub fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(self.client.get(self.url(path)), cookie)
    }

    /// PUT with an optional `name=value` cookie pair.
    pub fn put(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(self.client.put(self.url(path)), cookie)
    }

    /// POST with an optional `name=value` cookie pair.
    pub fn post(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(self.client.post(self.url(path)), cookie)
    }

    /// DELETE with an optional `name=value` cookie pair.
    pub fn delete(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(self.client.delete(self.url(path)), cookie)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

fn with_cookie(builder: reqwest::RequestBuilder, cookie: Option<&str>) -> reqwest::RequestBuilder {
    match cookie {
        Some(cookie) => builder.header(COOKIE, cookie),
        None => builder,
    }
}

/// All `Set-Cookie` headers on a response.
pub fn set_cookies(resp: &Response) -> Vec<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// The `name=value` pair of the single `Set-Cookie` header.
pub fn cookie_pair(resp: &Response) -> Option<String> {
    set_cookies(resp)
        .first()
        .and_then(|c| c.split(';').next())
        .map(str::to_string)
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl SessionStore for FailingStore {
    async fn get(&self, _id: &str) -> satchel_session::Result<Session> {
        Err(satchel_session::Error::Store("store offline".to_string()))
    }

    async fn set(&self, _session: &Session) -> satchel_session::Result<()> {
        Err(satchel_session::Error::Store("store offline".to_string()))
    }

    async fn delete(&self, _id: &str) -> satchel_session::Result<()> {
        Err(satchel_session::Error::Store("store offline".to_string()))
    }

    async fn all(&self) -> satchel_session::Result<Vec<Session>> {
        Err(satchel_session::Error::Store("store offline".to_string()))
    }
}

/// Memory store whose first `parties` lookups wait for each other.
///
/// Lets concurrent requests all resolve before any of them saves. Later
/// lookups pass straight through.
pub struct GatedStore {
    inner: MemoryStore,
    gate: Barrier,
    armed: AtomicUsize,
}

impl GatedStore {
    pub fn new(parties: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            gate: Barrier::new(parties),
            armed: AtomicUsize::new(parties),
        }
    }
}

#[async_trait]
impl SessionStore for GatedStore {
    async fn get(&self, id: &str) -> satchel_session::Result<Session> {
        let session = self.inner.get(id).await?;
        let gated = self
            .armed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.gate.wait().await;
        }
        Ok(session)
    }

    async fn set(&self, session: &Session) -> satchel_session::Result<()> {
        self.inner.set(session).await
    }

    async fn delete(&self, id: &str) -> satchel_session::Result<()> {
        self.inner.delete(id).await
    }

    async fn all(&self) -> satchel_session::Result<Vec<Session>> {
        self.inner.all().await
    }
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
