//! Server-side session state with pluggable storage.
//!
//! This crate provides the pieces the HTTP layer builds on:
//! - [`Session`]: an opaque id, an expiry and a bag of JSON values
//! - [`SessionStore`]: the contract backing engines implement
//! - [`MemoryStore`] and [`SqliteStore`]: two interchangeable engines
//! - [`prune_expired`]: garbage collection of expired records
//!
//! # Example
//!
//! ```rust,ignore
//! use satchel_session::{SessionStore, SqliteStore};
//!
//! let store = SqliteStore::open("sessions.db")?;
//! let mut session = store.get("").await?;
//! session.set("user", "alice")?;
//! store.set(&session).await?;
//! ```

mod error;
mod memory;
mod session;
mod sqlite;
mod store;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use session::{SESSION_ID_BYTES, Session};
pub use sqlite::SqliteStore;
pub use store::{SessionStore, prune_expired};
