//! Cache entries and read results.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tileconf_core::{ParsedLayer, Revision, Timestamp};

/// The cache's unit of storage for one key.
///
/// `updated` is the revision of the row `layer` was parsed from. An entry
/// whose layer has been released is kept until the next `get` evicts it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    layer: Option<Arc<ParsedLayer>>,
    updated: Revision,
    loaded_at: Timestamp,
}

impl CacheEntry {
    /// Create an entry for a freshly parsed layer.
    pub fn loaded(layer: Arc<ParsedLayer>, updated: Revision) -> Self {
        Self {
            layer: Some(layer),
            updated,
            loaded_at: Utc::now(),
        }
    }

    pub fn layer(&self) -> Option<&Arc<ParsedLayer>> {
        self.layer.as_ref()
    }

    pub fn updated(&self) -> Revision {
        self.updated
    }

    pub fn loaded_at(&self) -> Timestamp {
        self.loaded_at
    }

    /// True when the entry holds no parsed layer.
    pub fn is_empty(&self) -> bool {
        self.layer.is_none()
    }

    /// Drop the parsed layer, keeping the key and revision.
    pub fn release(&mut self) -> Option<Arc<ParsedLayer>> {
        self.layer.take()
    }
}

/// How a read was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Cached layer reused; only the revision was read.
    Hit,
    /// Key was not cached; the row was fetched and parsed.
    Miss,
    /// Cached layer was stale; the row was refetched and reparsed.
    Reloaded,
}

/// Result of a store read, carrying how it was served.
#[derive(Debug, Clone)]
pub struct LayerRead {
    layer: Arc<ParsedLayer>,
    revision: Revision,
    outcome: ReadOutcome,
    loaded_at: Timestamp,
}

impl LayerRead {
    pub fn new(
        layer: Arc<ParsedLayer>,
        revision: Revision,
        outcome: ReadOutcome,
        loaded_at: Timestamp,
    ) -> Self {
        Self {
            layer,
            revision,
            outcome,
            loaded_at,
        }
    }

    /// Consume the wrapper and return the layer.
    pub fn into_layer(self) -> Arc<ParsedLayer> {
        self.layer
    }

    pub fn layer(&self) -> &Arc<ParsedLayer> {
        &self.layer
    }

    /// Revision of the row the layer was parsed from.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn outcome(&self) -> ReadOutcome {
        self.outcome
    }

    pub fn was_cache_hit(&self) -> bool {
        self.outcome == ReadOutcome::Hit
    }

    /// How long ago the layer was parsed.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.loaded_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl AsRef<ParsedLayer> for LayerRead {
    fn as_ref(&self) -> &ParsedLayer {
        &self.layer
    }
}
