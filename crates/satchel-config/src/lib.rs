//! Configuration system for Satchel.
//!
//! Provides TOML-based configuration with:
//! - `[server]`, `[session]` and `[store]` sections, all optional
//! - Config file layering (user config dir + project-local `satchel.toml`)
//!
//! CLI flags are applied on top by the binary.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
