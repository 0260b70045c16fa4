//! Serve command - runs the session server.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Args;
use console::style;

use satchel_config::{SatchelConfig, StoreBackend};
use satchel_server::{Server, ServerConfig, SessionConfig};
use satchel_session::{SessionStore, prune_expired};

use super::{Context, open_store};

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Store backend: sqlite or memory (overrides config)
    #[arg(long)]
    pub backend: Option<StoreBackend>,

    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Session cookie name (overrides config)
    #[arg(long)]
    pub cookie_name: Option<String>,

    /// Session cookie path (overrides config)
    #[arg(long)]
    pub cookie_path: Option<String>,

    /// Session cookie domain (overrides config)
    #[arg(long)]
    pub cookie_domain: Option<String>,

    /// Idle timeout in seconds (overrides config)
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Seconds between sweeps of expired sessions; 0 disables the sweep
    #[arg(long, default_value = "300")]
    pub prune_interval: u64,

    /// Disable per-request logging
    #[arg(long)]
    pub quiet_requests: bool,
}

/// Everything the server needs, with CLI overrides applied.
#[derive(Debug)]
struct Settings {
    addr: SocketAddr,
    session: SessionConfig,
    store: satchel_config::StoreConfig,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let settings = resolve_settings(&args, &loaded.config)?;

    if ctx.verbose {
        for path in loaded.loaded_from() {
            println!("Config: {}", path.display());
        }
    }

    let store = open_store(&settings.store)?;

    println!(
        "{} {} ({} store{})",
        style("Satchel listening on").bold(),
        style(settings.addr).cyan(),
        settings.store.backend,
        match settings.store.backend {
            StoreBackend::Sqlite => format!(" at {}", settings.store.resolved_path().display()),
            StoreBackend::Memory => String::new(),
        }
    );

    if args.prune_interval > 0 {
        spawn_pruner(store.clone(), Duration::from_secs(args.prune_interval));
    }

    let server_config = ServerConfig::new()
        .with_bind_address(settings.addr)
        .with_request_logging(!args.quiet_requests);

    Server::new(store, settings.session, server_config)
        .run()
        .await
        .context("server exited with an error")
}

fn resolve_settings(args: &ServeArgs, config: &SatchelConfig) -> Result<Settings> {
    let server = config.server();
    let bind = args.bind.clone().unwrap_or(server.bind);
    let port = args.port.unwrap_or(server.port);
    let ip: IpAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;

    let file_session = config.session();
    let mut session = SessionConfig::new()
        .with_cookie_name(args.cookie_name.clone().unwrap_or(file_session.cookie_name))
        .with_cookie_path(args.cookie_path.clone().unwrap_or(file_session.cookie_path))
        .with_idle_timeout(Duration::from_secs(
            args.idle_timeout.unwrap_or(file_session.idle_timeout_secs),
        ));
    if let Some(domain) = args.cookie_domain.clone().or(file_session.cookie_domain) {
        session = session.with_cookie_domain(domain);
    }

    let mut store = config.store();
    if let Some(backend) = args.backend {
        store.backend = backend;
    }
    if let Some(db) = &args.db {
        store.path = Some(db.clone());
    }

    Ok(Settings {
        addr: SocketAddr::new(ip, port),
        session,
        store,
    })
}

fn spawn_pruner(store: Arc<dyn SessionStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = prune_expired(store.as_ref(), Utc::now()).await {
                tracing::warn!(error = %e, "Expired session sweep failed");
            }
        }
    });
}
