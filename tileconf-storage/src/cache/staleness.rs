//! Revision comparison for cached layers.
//!
//! Staleness is decided by inequality of the row's `updated` stamp and the
//! stamp the cached layer was parsed from. Elapsed time plays no part and
//! there is no notification channel: every check reads the stamp.

use crate::LayerSource;
use std::sync::atomic::{AtomicU64, Ordering};
use tileconf_core::{LayerKey, Revision, TileConfResult};

/// Result of comparing a cached revision with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// The row still carries the cached revision.
    Fresh,
    /// The row has been modified since it was cached.
    Stale { cached: Revision, current: Revision },
    /// The row no longer exists.
    Vanished { cached: Revision },
}

impl Staleness {
    /// Compare a cached revision with the store's current one.
    pub fn classify(cached: Revision, current: Option<Revision>) -> Self {
        match current {
            Some(current) if current == cached => Staleness::Fresh,
            Some(current) => Staleness::Stale { cached, current },
            None => Staleness::Vanished { cached },
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Staleness::Fresh)
    }
}

/// Issues revision checks against a source and counts them.
#[derive(Debug, Default)]
pub struct StalenessTracker {
    checks: AtomicU64,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one cached key. Costs exactly one revision read.
    pub async fn check<S>(
        &self,
        source: &S,
        key: &LayerKey,
        cached: Revision,
    ) -> TileConfResult<Staleness>
    where
        S: LayerSource + ?Sized,
    {
        self.checks.fetch_add(1, Ordering::Relaxed);
        let current = source.revision(key).await?;
        Ok(Staleness::classify(cached, current))
    }

    /// Number of checks issued.
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }
}
