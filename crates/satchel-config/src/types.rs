//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1"
//! port = 8080
//!
//! [session]
//! cookie_name = "session"
//! cookie_path = "/"
//! cookie_domain = "example.com"
//! idle_timeout_secs = 1800
//!
//! [store]
//! backend = "sqlite"
//! path = "/var/lib/satchel/sessions.db"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default port for the HTTP server.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address for the HTTP server.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "session";

/// Default session cookie path.
pub const DEFAULT_COOKIE_PATH: &str = "/";

/// Default idle timeout (30 minutes).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

/// Default SQLite database filename inside the data directory.
pub const DEFAULT_DB_FILE: &str = "sessions.db";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatchelConfig {
    /// HTTP server settings.
    pub server: Option<ServerConfig>,

    /// Session cookie and timeout settings.
    pub session: Option<SessionConfig>,

    /// Backing store settings.
    pub store: Option<StoreConfig>,
}

impl SatchelConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections replace whole; there is no field-level merging.
    pub fn merge(&mut self, other: SatchelConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.store.is_some() {
            self.store = other.store;
        }
    }

    /// Server settings, falling back to defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Session settings, falling back to defaults.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Store settings, falling back to defaults.
    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session cookie and expiry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the cookie carrying the session id.
    pub cookie_name: String,
    /// Cookie path.
    pub cookie_path: String,
    /// Cookie domain. Omitted from the cookie when unset.
    pub cookie_domain: Option<String>,
    /// Seconds added to "now" on every successful save.
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_path: DEFAULT_COOKIE_PATH.to_string(),
            cookie_domain: None,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Which backing engine holds sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite database file.
    #[default]
    Sqlite,
    /// Process memory; contents vanish on restart.
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = crate::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(crate::ConfigError::Invalid {
                field: "store.backend".to_string(),
                reason: format!("unknown backend '{other}' (expected 'sqlite' or 'memory')"),
            }),
        }
    }
}

/// Backing store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Engine to use.
    pub backend: StoreBackend,
    /// Database path for the SQLite engine. Defaults to the platform data dir.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolve the database path, falling back to `<data dir>/satchel/sessions.db`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("satchel"))
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DB_FILE)
        })
    }
}
