//! tileconf Storage - Layer Source Trait, Mock Implementation and Layer Cache
//!
//! Defines the backing-store abstraction for layer and configuration rows,
//! the global configuration loader, and the `LayerStore` that keeps parsed
//! layers in memory until their row changes.
//! The PostgreSQL implementation lives in tileconf-pg.

pub mod cache;
pub mod loader;
pub mod source;

pub use cache::{
    CacheEntry, CacheStats, LayerRead, LayerStore, ReadOutcome, Staleness, StalenessTracker,
    WarmReport,
};
pub use loader::{load_global_config, StoreOptions};
pub use source::LayerSource;

use ::async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tileconf_core::{ConfigRow, LayerKey, LayerRow, Revision, TileConfError, TileConfResult};

// ============================================================================
// MOCK LAYER SOURCE
// ============================================================================

/// In-memory layer source for tests and local runs.
///
/// Rows are edited the way an external editor tool would edit the database:
/// every write bumps the row's revision. Counters record how many timestamp
/// and full-row reads the store issued.
#[derive(Debug, Default)]
pub struct MockLayerSource {
    layers: RwLock<BTreeMap<LayerKey, LayerRow>>,
    configs: RwLock<HashMap<String, ConfigRow>>,
    unavailable: AtomicBool,
    latency: RwLock<Option<Duration>>,
    revision_reads: AtomicU64,
    fetches: AtomicU64,
}

impl MockLayerSource {
    /// Create an empty mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock source holding one configuration row.
    pub fn with_config(name: &str, cache: &str) -> Self {
        let source = Self::new();
        source.insert_config(name, cache);
        source
    }

    /// Insert or replace a layer row with an explicit revision.
    pub fn insert_layer(&self, key: impl Into<LayerKey>, value: impl Into<String>, updated: Revision) {
        let row = LayerRow::new(key, value, updated);
        self.layers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(row.key.clone(), row);
    }

    /// Replace a layer's definition and bump its revision.
    ///
    /// Inserts the row if it does not exist. Returns the new revision.
    pub fn update_layer(&self, key: impl Into<LayerKey>, value: impl Into<String>) -> Revision {
        let key = key.into();
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let updated = layers
            .get(&key)
            .map(|row| row.updated.successor())
            .unwrap_or_else(Revision::now);
        layers.insert(key.clone(), LayerRow::new(key, value, updated));
        updated
    }

    /// Bump a layer's revision without changing its definition.
    pub fn touch(&self, key: &LayerKey) -> Option<Revision> {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let row = layers.get_mut(key)?;
        row.updated = row.updated.successor();
        Some(row.updated)
    }

    /// Delete a layer row.
    pub fn remove_layer(&self, key: &LayerKey) -> Option<LayerRow> {
        self.layers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Insert or replace a configuration row.
    pub fn insert_config(&self, name: &str, cache: &str) {
        self.configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), ConfigRow::new(name, cache));
    }

    /// Make every subsequent read fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every read by `latency`, to widen race windows in tests.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.write().unwrap_or_else(PoisonError::into_inner) = Some(latency);
        self
    }

    /// Number of timestamp-only reads served.
    pub fn revision_reads(&self) -> u64 {
        self.revision_reads.load(Ordering::SeqCst)
    }

    /// Number of full-row reads served.
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Get count of stored layer rows.
    pub fn layer_count(&self) -> usize {
        self.layers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn ready(&self) -> TileConfResult<()> {
        let latency = *self.latency.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TileConfError::unavailable("mock source is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl LayerSource for MockLayerSource {
    async fn keys(&self) -> TileConfResult<Vec<LayerKey>> {
        self.ready().await?;
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(layers.keys().cloned().collect())
    }

    async fn rows(&self) -> TileConfResult<Vec<LayerRow>> {
        self.ready().await?;
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(layers.values().cloned().collect())
    }

    async fn exists(&self, key: &LayerKey) -> TileConfResult<bool> {
        self.ready().await?;
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(layers.contains_key(key))
    }

    async fn revision(&self, key: &LayerKey) -> TileConfResult<Option<Revision>> {
        self.ready().await?;
        self.revision_reads.fetch_add(1, Ordering::SeqCst);
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(layers.get(key).map(|row| row.updated))
    }

    async fn fetch(&self, key: &LayerKey) -> TileConfResult<Option<LayerRow>> {
        self.ready().await?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(layers.get(key).cloned())
    }

    async fn config(&self, name: &str) -> TileConfResult<Option<ConfigRow>> {
        self.ready().await?;
        let configs = self.configs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(configs.get(name).cloned())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_layer_bumps_revision() {
        let source = MockLayerSource::new();
        let key = LayerKey::from("roads");
        let first = source.update_layer(key.clone(), "{}");
        let second = source.update_layer(key.clone(), "{}");
        assert_ne!(first, second);
        assert_eq!(source.revision(&key).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_touch_changes_revision_only() {
        let source = MockLayerSource::new();
        let key = LayerKey::from("roads");
        source.insert_layer(key.clone(), r#"{"a": 1}"#, Revision::unset());
        let bumped = source.touch(&key).unwrap();
        let row = source.fetch(&key).await.unwrap().unwrap();
        assert_eq!(row.updated, bumped);
        assert_eq!(row.value, r#"{"a": 1}"#);
        assert!(source.touch(&LayerKey::from("missing")).is_none());
    }

    #[tokio::test]
    async fn test_keys_are_sorted_and_live() {
        let source = MockLayerSource::new();
        source.update_layer("water", "{}");
        source.update_layer("roads", "{}");
        assert_eq!(
            source.keys().await.unwrap(),
            vec![LayerKey::from("roads"), LayerKey::from("water")]
        );
        source.remove_layer(&LayerKey::from("roads"));
        assert_eq!(source.keys().await.unwrap(), vec![LayerKey::from("water")]);
    }

    #[tokio::test]
    async fn test_unavailable_source_fails_every_read() {
        let source = MockLayerSource::with_config("default", r#"{"name": "Test"}"#);
        source.set_unavailable(true);
        assert!(source.keys().await.unwrap_err().is_unavailable());
        assert!(source.config("default").await.unwrap_err().is_unavailable());
        assert!(source
            .exists(&LayerKey::from("roads"))
            .await
            .unwrap_err()
            .is_unavailable());

        source.set_unavailable(false);
        assert!(source.config("default").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_counters_track_read_kinds() {
        let source = MockLayerSource::new();
        let key = LayerKey::from("roads");
        source.update_layer(key.clone(), "{}");
        source.revision(&key).await.unwrap();
        source.revision(&key).await.unwrap();
        source.fetch(&key).await.unwrap();
        assert_eq!(source.revision_reads(), 2);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_config_lookup_is_exact() {
        let source = MockLayerSource::with_config("default", r#"{"name": "Test"}"#);
        assert!(source.config("default").await.unwrap().is_some());
        assert!(source.config("Default").await.unwrap().is_none());
        assert!(source.config("").await.unwrap().is_none());
    }
}
