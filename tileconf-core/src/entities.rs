//! Persisted row types and identifiers

use crate::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

// ============================================================================
// LAYER KEY
// ============================================================================

/// Opaque identifier of a layer, unique within the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerKey(String);

impl LayerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LayerKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for LayerKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for LayerKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// REVISION
// ============================================================================

/// The `updated` stamp of a layer row.
///
/// Revisions are only ever compared for equality: any difference between the
/// stamp a layer was parsed from and the store's current stamp means the
/// cached layer is stale, regardless of direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(Timestamp);

impl Revision {
    pub fn new(at: Timestamp) -> Self {
        Self(at)
    }

    /// Revision used for rows whose `updated` column is NULL.
    pub fn unset() -> Self {
        Self(DateTime::UNIX_EPOCH)
    }

    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn at(&self) -> Timestamp {
        self.0
    }

    /// The smallest revision strictly later than `self`, or now if later still.
    pub fn successor(&self) -> Self {
        let bumped = self.0 + chrono::Duration::milliseconds(1);
        Self(bumped.max(Utc::now()))
    }
}

impl From<Timestamp> for Revision {
    fn from(value: Timestamp) -> Self {
        Self(value)
    }
}

impl From<Option<Timestamp>> for Revision {
    fn from(value: Option<Timestamp>) -> Self {
        value.map(Self).unwrap_or_else(Self::unset)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// A persisted layer record.
///
/// `value` is kept as the raw text read from the store so that rows which
/// are not valid JSON can still be represented and reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRow {
    pub key: LayerKey,
    pub value: String,
    pub updated: Revision,
}

impl LayerRow {
    pub fn new(key: impl Into<LayerKey>, value: impl Into<String>, updated: Revision) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            updated,
        }
    }
}

/// A persisted configuration record, looked up by exact `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRow {
    pub name: String,
    pub cache: String,
}

impl ConfigRow {
    pub fn new(name: impl Into<String>, cache: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cache: cache.into(),
        }
    }
}
