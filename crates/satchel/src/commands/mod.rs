//! CLI command handlers.

pub mod config;
pub mod serve;
pub mod sessions;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use satchel_config::{ConfigSource, LoadedConfig, StoreBackend, StoreConfig};
use satchel_session::{MemoryStore, SessionStore, SqliteStore};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load configuration from `--config` or by discovery, printing warnings.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = match &self.config_path {
            Some(path) => {
                let config = satchel_config::load_config_file(path)?;
                LoadedConfig {
                    config,
                    sources: vec![ConfigSource {
                        path: path.clone(),
                        loaded: true,
                    }],
                    warnings: Vec::new(),
                }
            }
            None => satchel_config::load_config(None)?,
        };

        for warning in &loaded.warnings {
            eprintln!("warning: {}", warning);
        }

        Ok(loaded)
    }
}

/// Open the configured session store.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            let path = config.resolved_path();
            let store = SqliteStore::open(&path)
                .with_context(|| format!("failed to open session database {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}
