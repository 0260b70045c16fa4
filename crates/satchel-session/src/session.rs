//! The session entity: an id, an expiry and a bag of values.

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Number of random bytes behind a session id (256 bits).
pub const SESSION_ID_BYTES: usize = 32;

/// Server-held state tied to a client through an opaque id.
///
/// The id is minted once at construction and never regenerated. A session
/// with no values is "empty" regardless of its expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    expires: Option<DateTime<Utc>>,
    values: HashMap<String, Value>,
}

/// Encoded form of a session as written to a store.
#[derive(Serialize, Deserialize)]
struct Record {
    id: String,
    expires: Option<DateTime<Utc>>,
    values: HashMap<String, Value>,
}

impl Session {
    /// Create an empty session with a freshly minted id.
    pub fn new() -> Result<Self> {
        Ok(Self {
            id: mint_id()?,
            expires: None,
            values: HashMap::new(),
        })
    }

    /// Build a session from its encoded form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record = decode_record(bytes)?;
        Ok(Self {
            id: record.id,
            expires: record.expires,
            values: record.values,
        })
    }

    /// The session id, also used as the store key and cookie value.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the session expires. `None` means it was never set.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn set_expiry(&mut self, expires: DateTime<Utc>) {
        self.expires = Some(expires);
    }

    /// Whether the session counts as expired at `now`.
    ///
    /// An unset expiry is treated as already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires {
            Some(expires) => now >= expires,
            None => true,
        }
    }

    /// Store a serializable value under `key`, replacing any previous value.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| Error::Value {
            key: key.clone(),
            source,
        })?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Read the value under `key` as `T`. Missing keys yield `Ok(None)`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| Error::Value {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Remove `key`. Removing a missing key is a no-op.
    pub fn delete(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// All keys currently held, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Remove every value.
    pub fn purge(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read-only view of the values.
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Encode the session, id included, for storage.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let record = Record {
            id: self.id.clone(),
            expires: self.expires,
            values: self.values.clone(),
        };
        serde_json::to_vec(&record).map_err(Error::Encode)
    }

    /// Replace id, expiry and values from an encoded record.
    ///
    /// On failure the session is left untouched.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        let record = decode_record(bytes)?;
        self.id = record.id;
        self.expires = record.expires;
        self.values = record.values;
        Ok(())
    }
}

fn decode_record(bytes: &[u8]) -> Result<Record> {
    let record: Record =
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))?;
    if record.id.is_empty() {
        return Err(Error::Decode("record has an empty session id".to_string()));
    }
    Ok(record)
}

/// Mint a cookie-safe id from the OS random source.
fn mint_id() -> Result<String> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
