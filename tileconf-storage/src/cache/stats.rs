//! Layer cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about layer cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a fresh cached layer.
    pub hits: u64,
    /// Reads of uncached keys.
    pub misses: u64,
    /// Reads that found a stale layer and reparsed it.
    pub stale_reloads: u64,
    /// Entries removed because they were empty, vanished, or evicted.
    pub evictions: u64,
    /// Rows that failed to parse.
    pub parse_failures: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.stale_reloads;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_reloads: AtomicU64,
    evictions: AtomicU64,
    parse_failures: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_reload(&self) {
        self.stale_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_reloads: self.stale_reloads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            entry_count: entry_count as u64,
        }
    }
}
