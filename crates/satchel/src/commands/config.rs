//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};

use super::Context;

/// Project-local config filename written by `config init --local`.
const LOCAL_CONFIG_FILE: &str = "satchel.toml";

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./satchel.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(local),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    if ctx.json_output {
        let resolved = serde_json::json!({
            "server": config.server(),
            "session": config.session(),
            "store": {
                "backend": config.store().backend,
                "path": config.store().resolved_path(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("# Satchel Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let server = config.server();
    println!("Server:");
    println!("  bind:         {}:{}", server.bind, server.port);
    println!();

    let session = config.session();
    println!("Session:");
    println!("  cookie name:  {}", session.cookie_name);
    println!("  cookie path:  {}", session.cookie_path);
    println!(
        "  domain:       {}",
        session.cookie_domain.as_deref().unwrap_or("(none)")
    );
    println!("  idle timeout: {}s", session.idle_timeout_secs);
    println!();

    let store = config.store();
    println!("Store:");
    println!("  backend:      {}", store.backend);
    println!("  path:         {}", store.resolved_path().display());

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'satchel config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(LOCAL_CONFIG_FILE)
    } else {
        let dir = satchel_config::user_config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;
        std::fs::create_dir_all(&dir)?;
        dir.join("config.toml")
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    std::fs::write(&path, TEMPLATE)?;
    println!("Created {}", path.display());

    Ok(())
}

fn cmd_path() -> Result<()> {
    match satchel_config::user_config_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("Could not determine config directory"),
    }
    Ok(())
}

const TEMPLATE: &str = r#"# Satchel Configuration

[server]
bind = "127.0.0.1"
port = 8080

[session]
cookie_name = "session"
cookie_path = "/"
# cookie_domain = "example.com"
idle_timeout_secs = 1800

[store]
# "sqlite" or "memory"
backend = "sqlite"
# path = "/var/lib/satchel/sessions.db"
"#;
