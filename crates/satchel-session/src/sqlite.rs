//! SQLite-backed session store.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::session::Session;
use crate::store::SessionStore;

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Session store backed by a single SQLite table.
///
/// Each session is one row keyed by id holding the encoded record. Writes
/// are upserts and are serialised through the connection mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a session database at `path`.
    ///
    /// Creates the parent directory and schema if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        info!("Session store opened at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn();

        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                expires_at TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Session> {
        let mut session = Session::new()?;
        if id.is_empty() {
            return Ok(session);
        }

        let conn = self.conn();
        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(data) = data else {
            trace!(session_id = %id, "No stored session, starting fresh");
            return Ok(session);
        };

        if let Err(e) = session.decode(&data) {
            warn!(session_id = %id, error = %e, "Deleting broken session record");
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        }

        Ok(session)
    }

    async fn set(&self, session: &Session) -> Result<()> {
        let data = session.encode()?;
        let expires_at = session.expiry().map(|t| t.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        self.conn().execute(
            "INSERT INTO sessions (id, data, expires_at, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![session.id(), data, expires_at, now],
        )?;

        trace!(session_id = %session.id(), "Session stored");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Session>> {
        let conn = self.conn();
        let mut sessions = Vec::new();
        let mut broken = Vec::new();

        {
            let mut stmt = conn.prepare("SELECT id, data FROM sessions ORDER BY updated_at DESC")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;

            for row in rows {
                let (id, data) = row?;
                match Session::from_bytes(&data) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        warn!(session_id = %id, error = %e, "Deleting broken session record");
                        broken.push(id);
                    }
                }
            }
        }

        for id in &broken {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        }

        Ok(sessions)
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to open in-memory store")
    }

    fn populated(key: &str) -> Session {
        let mut session = Session::new().unwrap();
        session.set(key, 42).unwrap();
        session.set_expiry(Utc::now() + Duration::minutes(30));
        session
    }

    fn insert_raw(store: &SqliteStore, id: &str, data: &[u8]) {
        store
            .conn()
            .execute(
                "INSERT INTO sessions (id, data, expires_at, updated_at) VALUES (?1, ?2, NULL, ?3)",
                params![id, data, Utc::now().to_rfc3339()],
            )
            .unwrap();
    }

    fn row_exists(store: &SqliteStore, id: &str) -> bool {
        store
            .conn()
            .query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()
            .unwrap()
            .is_some()
    }

    #[test]
    fn test_schema_is_created() {
        let store = test_store();
        let version: i32 = store
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_get_empty_and_unknown_ids() {
        let store = test_store();

        let empty = store.get("").await.unwrap();
        assert!(!empty.id().is_empty());
        assert!(empty.is_empty());

        let unknown = store.get("unknown").await.unwrap();
        assert_ne!(unknown.id(), "unknown");
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = test_store();
        let session = populated("visits");
        store.set(&session).await.unwrap();

        let fetched = store.get(session.id()).await.unwrap();
        assert_eq!(fetched.id(), session.id());
        assert_eq!(fetched.expiry(), session.expiry());
        assert_eq!(fetched.get::<i32>("visits").unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_set_is_upsert() {
        let store = test_store();
        let mut session = populated("visits");
        store.set(&session).await.unwrap();

        session.set("visits", 43).unwrap();
        store.set(&session).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let fetched = store.get(session.id()).await.unwrap();
        assert_eq!(fetched.get::<i32>("visits").unwrap(), Some(43));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = test_store();
        let session = populated("visits");
        store.set(&session).await.unwrap();

        store.delete(session.id()).await.unwrap();
        assert!(!row_exists(&store, session.id()));

        // Deleting again is a no-op
        store.delete(session.id()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_broken_record_self_heals() {
        let store = test_store();
        insert_raw(&store, "broken", b"\x00\x01");

        let session = store.get("broken").await.unwrap();
        assert!(session.is_empty());
        assert!(!row_exists(&store, "broken"));
    }

    #[tokio::test]
    async fn test_all_removes_corrupt_record() {
        let store = test_store();
        for key in ["a", "b", "c", "d"] {
            store.set(&populated(key)).await.unwrap();
        }
        insert_raw(&store, "broken", b"not json");

        assert_eq!(store.len().await.unwrap(), 5);

        let sessions = store.all().await.unwrap();
        assert_eq!(sessions.len(), 4);
        assert!(!row_exists(&store, "broken"));
        assert_eq!(store.len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sessions.db");
        let session = populated("user");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set(&session).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let fetched = store.get(session.id()).await.unwrap();
        assert_eq!(fetched, session);
    }
}
