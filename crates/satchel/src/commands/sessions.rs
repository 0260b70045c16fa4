//! Sessions command - inspect and maintain the session store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use console::{Style, style};
use serde::Serialize;
use serde_json::Value;

use satchel_config::StoreBackend;
use satchel_session::{Session, SessionStore, prune_expired};

use super::{Context, open_store};

/// Arguments for the sessions command.
#[derive(Args, Debug)]
pub struct SessionsArgs {
    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: SessionsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// List stored sessions
    List,

    /// Show one session's values
    Show {
        /// Session id
        id: String,
    },

    /// Delete a stored session
    Delete {
        /// Session id
        id: String,
    },

    /// Delete every expired session
    Prune,
}

/// One row of `sessions list`.
#[derive(Debug, Serialize)]
struct SessionSummary {
    id: String,
    expires: Option<DateTime<Utc>>,
    expired: bool,
    keys: usize,
}

/// Output of `sessions show`.
#[derive(Debug, Serialize)]
struct SessionDetail {
    id: String,
    expires: Option<DateTime<Utc>>,
    expired: bool,
    values: HashMap<String, Value>,
}

/// Run the sessions command.
pub async fn run(args: SessionsArgs, ctx: &Context) -> Result<()> {
    let store = open_configured_store(args.db, ctx)?;

    match args.command {
        SessionsCommand::List => cmd_list(store.as_ref(), ctx).await,
        SessionsCommand::Show { id } => cmd_show(store.as_ref(), &id, ctx).await,
        SessionsCommand::Delete { id } => cmd_delete(store.as_ref(), &id, ctx).await,
        SessionsCommand::Prune => cmd_prune(store.as_ref(), ctx).await,
    }
}

fn open_configured_store(db: Option<PathBuf>, ctx: &Context) -> Result<Arc<dyn SessionStore>> {
    let mut store = ctx.load_config()?.config.store();
    if let Some(db) = db {
        store.backend = StoreBackend::Sqlite;
        store.path = Some(db);
    }

    if store.backend == StoreBackend::Memory {
        bail!("the memory store lives inside the server process and cannot be inspected");
    }

    if ctx.verbose {
        eprintln!("Store: {}", store.resolved_path().display());
    }
    open_store(&store)
}

fn summarize(session: &Session, now: DateTime<Utc>) -> SessionSummary {
    SessionSummary {
        id: session.id().to_string(),
        expires: session.expiry(),
        expired: session.is_expired_at(now),
        keys: session.len(),
    }
}

async fn cmd_list(store: &dyn SessionStore, ctx: &Context) -> Result<()> {
    let now = Utc::now();
    let mut sessions: Vec<SessionSummary> = store
        .all()
        .await?
        .iter()
        .map(|s| summarize(s, now))
        .collect();
    sessions.sort_by(|a, b| b.expires.cmp(&a.expires));

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if sessions.is_empty() {
        println!("{}", dim.apply_to("No sessions stored"));
        return Ok(());
    }

    println!("{}", style("Sessions").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    for session in &sessions {
        let expires = session
            .expires
            .map(|e| e.to_rfc3339())
            .unwrap_or_else(|| "never set".to_string());
        let state = if session.expired {
            style("expired").red()
        } else {
            style("live").green()
        };
        println!(
            "{}  {}  {} key(s)  {}",
            session.id,
            state,
            session.keys,
            dim.apply_to(expires)
        );
    }
    println!();
    println!("{} session(s)", sessions.len());

    Ok(())
}

async fn cmd_show(store: &dyn SessionStore, id: &str, ctx: &Context) -> Result<()> {
    let session = store.get(id).await?;
    // The store mints a fresh session for unknown ids
    if session.id() != id {
        bail!("session not found: {}", id);
    }

    let detail = SessionDetail {
        id: session.id().to_string(),
        expires: session.expiry(),
        expired: session.is_expired_at(Utc::now()),
        values: session.values().clone(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{} {}", style("Session").bold(), detail.id);
    match detail.expires {
        Some(expires) => {
            let note = if detail.expired { " (expired)" } else { "" };
            println!("Expires: {}{}", expires.to_rfc3339(), note);
        }
        None => println!("Expires: {}", dim.apply_to("never set")),
    }
    println!();

    let mut keys: Vec<_> = detail.values.keys().collect();
    keys.sort();
    for key in keys {
        println!("  {} = {}", style(key).cyan(), detail.values[key]);
    }

    Ok(())
}

async fn cmd_delete(store: &dyn SessionStore, id: &str, ctx: &Context) -> Result<()> {
    store.delete(id).await?;

    if ctx.json_output {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted session {}", id);
    }
    Ok(())
}

async fn cmd_prune(store: &dyn SessionStore, ctx: &Context) -> Result<()> {
    let removed = prune_expired(store, Utc::now()).await?;

    if ctx.json_output {
        println!("{}", serde_json::json!({ "pruned": removed }));
    } else {
        println!("Pruned {} expired session(s)", removed);
    }
    Ok(())
}
