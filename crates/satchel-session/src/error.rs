//! Error types for session and store operations.

/// Error type for session and store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The OS random source could not supply bytes for a session id.
    #[error("Failed to mint session id: {0}")]
    Entropy(String),

    /// A stored session record could not be decoded.
    #[error("Failed to decode session record: {0}")]
    Decode(String),

    /// A session could not be encoded for storage.
    #[error("Failed to encode session: {0}")]
    Encode(#[source] serde_json::Error),

    /// A session value could not be converted to or from the requested type.
    #[error("Invalid value for session key '{key}': {source}")]
    Value {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Generic backing engine failure.
    #[error("Store error: {0}")]
    Store(String),

    /// SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure while opening a store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from the backing engine rather than from a
    /// session's own contents.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store(_) | Error::Database(_) | Error::Io(_))
    }
}

/// Result type for session and store operations.
pub type Result<T> = std::result::Result<T, Error>;
