//! # Core Entities
//!
//! Identifiers and store records shared across the process boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Any structurally-cloneable value that can live in the store.
pub type Value = serde_json::Value;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Identifier of a worker context ("window").
///
/// Serialized as a bare string so it appears unchanged in the wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for WindowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One authoritative record in the data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Flat, opaque key.
    pub key: String,
    /// Current value.
    pub value: Value,
    /// Bumped on every successful mutation of this key, never reset.
    pub version: u64,
    /// Window that performed the last write, `None` for the host itself.
    pub last_writer_window_id: Option<WindowId>,
    /// When the last write happened.
    pub updated_at: Timestamp,
}

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: Value,
    pub version: u64,
}

impl From<&Entry> for VersionedValue {
    fn from(entry: &Entry) -> Self {
        Self {
            value: entry.value.clone(),
            version: entry.version,
        }
    }
}
