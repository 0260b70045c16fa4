//! Application state shared across handlers.

use std::sync::Arc;

use satchel_session::SessionStore;

use crate::config::{ServerConfig, SessionConfig};
use crate::manager::SessionManager;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session lifecycle manager.
    pub sessions: SessionManager,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create a new application state over `store`.
    pub fn new(store: Arc<dyn SessionStore>, session: SessionConfig, config: ServerConfig) -> Self {
        Self {
            sessions: SessionManager::new(store, session),
            config: Arc::new(config),
        }
    }

    /// Create application state from an existing manager.
    pub fn with_manager(sessions: SessionManager, config: ServerConfig) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
