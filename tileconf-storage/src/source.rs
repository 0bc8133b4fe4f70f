//! Async backing-store trait for layer and configuration rows.
//!
//! `LayerStore` never talks to a database directly; every read goes through
//! a `LayerSource`. The PostgreSQL implementation lives in tileconf-pg and
//! an in-memory implementation (`MockLayerSource`) lives in this crate.

use ::async_trait::async_trait;
use std::sync::Arc;
use tileconf_core::{ConfigRow, LayerKey, LayerRow, Revision, TileConfResult};

/// Read access to the layers and configuration tables.
///
/// Every method is a live read. Implementations report connection-level
/// failures as `StoreUnavailable` and absence as `Ok(None)` / `Ok(false)`.
#[async_trait]
pub trait LayerSource: Send + Sync {
    // ========================================================================
    // LAYER ROWS
    // ========================================================================

    /// All layer keys currently present.
    async fn keys(&self) -> TileConfResult<Vec<LayerKey>>;

    /// All layer rows currently present.
    async fn rows(&self) -> TileConfResult<Vec<LayerRow>>;

    /// Whether a row exists for `key`.
    async fn exists(&self, key: &LayerKey) -> TileConfResult<bool>;

    /// The `updated` stamp of the row for `key`, without its definition.
    async fn revision(&self, key: &LayerKey) -> TileConfResult<Option<Revision>>;

    /// The full row for `key`.
    async fn fetch(&self, key: &LayerKey) -> TileConfResult<Option<LayerRow>>;

    // ========================================================================
    // CONFIGURATION ROWS
    // ========================================================================

    /// The configuration row whose name matches `name` exactly.
    async fn config(&self, name: &str) -> TileConfResult<Option<ConfigRow>>;
}

#[async_trait]
impl<S> LayerSource for Arc<S>
where
    S: LayerSource + ?Sized,
{
    async fn keys(&self) -> TileConfResult<Vec<LayerKey>> {
        (**self).keys().await
    }

    async fn rows(&self) -> TileConfResult<Vec<LayerRow>> {
        (**self).rows().await
    }

    async fn exists(&self, key: &LayerKey) -> TileConfResult<bool> {
        (**self).exists(key).await
    }

    async fn revision(&self, key: &LayerKey) -> TileConfResult<Option<Revision>> {
        (**self).revision(key).await
    }

    async fn fetch(&self, key: &LayerKey) -> TileConfResult<Option<LayerRow>> {
        (**self).fetch(key).await
    }

    async fn config(&self, name: &str) -> TileConfResult<Option<ConfigRow>> {
        (**self).config(name).await
    }
}
