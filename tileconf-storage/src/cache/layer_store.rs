//! Layer store with lazy, revision-based invalidation.
//!
//! Parsed layers are cached per key together with the revision of the row
//! they came from. Each `get` of a cached key reads the row's current
//! revision; a match returns the cached layer, a mismatch refetches and
//! reparses the row.
//!
//! # Concurrency
//!
//! Reads are serialized per key: concurrent `get` calls for one key queue on
//! that key's flight lock, so a stale row is refetched and reparsed once and
//! the waiters see the fresh entry as a hit. Reads of different keys run in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use tileconf_core::{
    CacheBackendParser, DefinitionParser, GlobalConfig, LayerKey, LayerParser, LayerRow,
    ParsedLayer, SpecParser, TileConfError, TileConfResult,
};

use super::entry::{CacheEntry, LayerRead, ReadOutcome};
use super::staleness::{Staleness, StalenessTracker};
use super::stats::{CacheStats, StatsRecorder};
use crate::loader::{load_global_config, StoreOptions};
use crate::LayerSource;

/// Outcome of warming every layer at start-up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarmReport {
    /// Keys that were parsed and cached.
    pub loaded: Vec<LayerKey>,
    /// Keys that failed, with the failure.
    pub failed: Vec<(LayerKey, TileConfError)>,
}

impl WarmReport {
    /// True when every layer loaded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

type FlightMap = DashMap<LayerKey, Arc<Mutex<()>>>;

/// A reader's share of a key's flight lock.
///
/// Dropping it removes the map entry once no other reader holds the lock,
/// including when the read is cancelled mid-flight.
struct Flight<'a> {
    flights: &'a FlightMap,
    key: &'a LayerKey,
    lock: Arc<Mutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(flights: &'a FlightMap, key: &'a LayerKey) -> Self {
        let lock = Arc::clone(flights.entry(key.clone()).or_default().value());
        Self { flights, key, lock }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // One reference in the map plus ours: nobody else is waiting.
        self.flights.remove_if(self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

/// Single point of access to layer definitions.
///
/// # Type Parameters
///
/// - `S`: the backing store holding layer and configuration rows
/// - `P`: the parser turning definition documents into layers
///
/// # Example
///
/// ```ignore
/// let store = LayerStore::open(source, &StoreOptions::default()).await?;
/// let roads = store.get(&LayerKey::from("roads")).await?;
/// ```
pub struct LayerStore<S, P = DefinitionParser> {
    source: S,
    parser: P,
    config: GlobalConfig,
    entries: RwLock<HashMap<LayerKey, CacheEntry>>,
    flights: FlightMap,
    tracker: StalenessTracker,
    stats: StatsRecorder,
}

impl<S> LayerStore<S, DefinitionParser>
where
    S: LayerSource,
{
    /// Open a store with the default parsers.
    ///
    /// Fails with `ConfigNotFound` or `InvalidCacheSpec` before any layer
    /// is read.
    pub async fn open(source: S, options: &StoreOptions) -> TileConfResult<Self> {
        Self::open_with(source, DefinitionParser, &SpecParser, options).await
    }
}

impl<S, P> LayerStore<S, P>
where
    S: LayerSource,
    P: LayerParser,
{
    /// Open a store with caller-supplied parsers.
    pub async fn open_with<C>(
        source: S,
        parser: P,
        cache_parser: &C,
        options: &StoreOptions,
    ) -> TileConfResult<Self>
    where
        C: CacheBackendParser + ?Sized,
    {
        let config = load_global_config(&source, cache_parser, options).await?;
        Ok(Self::with_config(source, parser, config))
    }

    /// Build a store around an already loaded configuration.
    pub fn with_config(source: S, parser: P, config: GlobalConfig) -> Self {
        Self {
            source,
            parser,
            config,
            entries: RwLock::new(HashMap::new()),
            flights: DashMap::new(),
            tracker: StalenessTracker::new(),
            stats: StatsRecorder::default(),
        }
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    // ========================================================================
    // LIVE READS
    // ========================================================================

    /// All keys currently in the store. Never served from cache.
    pub async fn keys(&self) -> TileConfResult<Vec<LayerKey>> {
        self.source.keys().await
    }

    /// All `(key, definition text)` pairs currently in the store.
    pub async fn items(&self) -> TileConfResult<Vec<(LayerKey, String)>> {
        let rows = self.source.rows().await?;
        Ok(rows.into_iter().map(|row| (row.key, row.value)).collect())
    }

    /// True if `key` is cached or a row for it exists.
    ///
    /// A cached key is reported present without consulting the store, even
    /// if its row has since been deleted. The next `get` of that key evicts it.
    pub async fn contains(&self, key: &LayerKey) -> TileConfResult<bool> {
        if self.entries.read().await.contains_key(key) {
            return Ok(true);
        }
        self.source.exists(key).await
    }

    // ========================================================================
    // CACHED READS
    // ========================================================================

    /// The parsed layer for `key`.
    ///
    /// Fails with `KeyNotFound` when no row exists and with
    /// `MalformedLayerDefinition` when the row cannot be parsed. On failure
    /// nothing is cached for `key`.
    pub async fn get(&self, key: &LayerKey) -> TileConfResult<Arc<ParsedLayer>> {
        Ok(self.read(key).await?.into_layer())
    }

    /// Like `get`, but reports how the read was served.
    pub async fn read(&self, key: &LayerKey) -> TileConfResult<LayerRead> {
        let flight = Flight::join(&self.flights, key);
        let _guard = flight.lock.lock().await;
        self.read_locked(key).await
    }

    async fn read_locked(&self, key: &LayerKey) -> TileConfResult<LayerRead> {
        let cached = self.entries.read().await.get(key).cloned();
        let Some(entry) = cached else {
            self.stats.record_miss();
            return self.load(key, ReadOutcome::Miss).await;
        };

        let Some(layer) = entry.layer() else {
            debug!(key = %key, "evicting empty cache entry");
            self.remove_entry(key).await;
            self.stats.record_miss();
            return self.load(key, ReadOutcome::Miss).await;
        };

        match self.tracker.check(&self.source, key, entry.updated()).await? {
            Staleness::Fresh => {
                self.stats.record_hit();
                debug!(key = %key, revision = %entry.updated(), "layer cache hit");
                Ok(LayerRead::new(
                    Arc::clone(layer),
                    entry.updated(),
                    ReadOutcome::Hit,
                    entry.loaded_at(),
                ))
            }
            Staleness::Stale { cached, current } => {
                info!(
                    key = %key,
                    cached = %cached,
                    current = %current,
                    "layer is stale, recompiling style"
                );
                layer.invalidate_style();
                self.entries.write().await.remove(key);
                self.stats.record_stale_reload();

                let read = self.load(key, ReadOutcome::Reloaded).await?;
                if read.layer().fingerprint() == layer.fingerprint() {
                    debug!(key = %key, "definition unchanged across revisions");
                }
                Ok(read)
            }
            Staleness::Vanished { cached } => {
                warn!(key = %key, revision = %cached, "cached layer row has been deleted");
                self.remove_entry(key).await;
                Err(TileConfError::key_not_found(key))
            }
        }
    }

    /// Fetch, parse and cache the row for `key`.
    async fn load(&self, key: &LayerKey, outcome: ReadOutcome) -> TileConfResult<LayerRead> {
        let row = self
            .source
            .fetch(key)
            .await?
            .ok_or_else(|| TileConfError::key_not_found(key))?;

        let layer = match self.parse_row(key, &row) {
            Ok(layer) => Arc::new(layer),
            Err(e) => {
                self.stats.record_parse_failure();
                warn!(key = %key, revision = %row.updated, error = %e, "failed to parse layer");
                return Err(e);
            }
        };

        let entry = CacheEntry::loaded(Arc::clone(&layer), row.updated);
        let loaded_at = entry.loaded_at();
        self.entries.write().await.insert(key.clone(), entry);

        info!(
            key = %key,
            revision = %row.updated,
            provider = layer.definition().provider.kind(),
            "layer loaded"
        );
        Ok(LayerRead::new(layer, row.updated, outcome, loaded_at))
    }

    fn parse_row(&self, key: &LayerKey, row: &LayerRow) -> TileConfResult<ParsedLayer> {
        let document: Value = serde_json::from_str(&row.value)
            .map_err(|e| TileConfError::malformed(key, format!("invalid JSON: {}", e)))?;
        let layer =
            self.parser
                .parse_layer(key, &document, &self.config, self.config.working_dir())?;
        Ok(layer.tagged(key.clone()))
    }

    // ========================================================================
    // CACHE MAINTENANCE
    // ========================================================================

    /// Parse every layer in the store.
    ///
    /// Layers that fail to parse are reported, not fatal. A store outage
    /// aborts the warm-up.
    pub async fn warm(&self) -> TileConfResult<WarmReport> {
        let mut report = WarmReport::default();
        for key in self.keys().await? {
            match self.get(&key).await {
                Ok(_) => report.loaded.push(key),
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    warn!(key = %key, error = %e, "layer failed to warm");
                    report.failed.push((key, e));
                }
            }
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "layer store warmed"
        );
        Ok(report)
    }

    /// Drop the parsed layer for `key` while keeping the key cached.
    ///
    /// Returns whether a parsed layer was held.
    pub async fn release(&self, key: &LayerKey) -> bool {
        let mut entries = self.entries.write().await;
        entries
            .get_mut(key)
            .and_then(CacheEntry::release)
            .is_some()
    }

    /// Remove `key` from the cache. Returns whether it was cached.
    pub async fn evict(&self, key: &LayerKey) -> bool {
        self.remove_entry(key).await
    }

    async fn remove_entry(&self, key: &LayerKey) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            self.stats.record_eviction();
        }
        removed
    }

    /// Keys currently cached, sorted.
    pub async fn cached_keys(&self) -> Vec<LayerKey> {
        let mut keys: Vec<LayerKey> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn stats(&self) -> CacheStats {
        let entry_count = self.entries.read().await.len();
        self.stats.snapshot(entry_count)
    }

    /// Number of revision checks issued so far.
    pub fn revision_checks(&self) -> u64 {
        self.tracker.checks()
    }
}
