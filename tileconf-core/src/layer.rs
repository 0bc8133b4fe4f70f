//! Parsed layers and their compiled style artifacts

use crate::{
    CacheBackendHandle, Fingerprint, GlobalConfig, LayerDefinition, LayerKey, LogLevel, Timestamp,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

// ============================================================================
// STYLE ARTIFACT
// ============================================================================

/// The expensive, compiled form of a layer's style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStyle {
    /// Resolved location of the style document.
    pub source: String,
    pub compiled_at: Timestamp,
}

/// Interior-mutable holder for a layer's compiled style.
///
/// The renderer fills it on first use; the store clears it in place when the
/// layer's row changes, leaving the rest of the layer untouched.
#[derive(Debug, Default)]
pub struct StyleSlot {
    compiled: RwLock<Option<Arc<CompiledStyle>>>,
    compilations: AtomicU64,
}

impl StyleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled style, if one is currently held.
    pub fn current(&self) -> Option<Arc<CompiledStyle>> {
        self.compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the held style, compiling it with `compile` if the slot is empty.
    pub fn get_or_compile(&self, compile: impl FnOnce() -> CompiledStyle) -> Arc<CompiledStyle> {
        if let Some(style) = self.current() {
            return style;
        }
        let mut slot = self.compiled.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(style) = slot.as_ref() {
            return Arc::clone(style);
        }
        let style = Arc::new(compile());
        self.compilations.fetch_add(1, Ordering::Relaxed);
        *slot = Some(Arc::clone(&style));
        style
    }

    /// Drop the compiled style. Returns whether one was held.
    pub fn clear(&self) -> bool {
        self.compiled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// How many times this slot has compiled a style.
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }
}

// ============================================================================
// PARSED LAYER
// ============================================================================

/// A layer definition interpreted against the global configuration and
/// ready for the rendering pipeline.
#[derive(Debug)]
pub struct ParsedLayer {
    key: LayerKey,
    definition: LayerDefinition,
    fingerprint: Fingerprint,
    cache: Arc<CacheBackendHandle>,
    log_level: LogLevel,
    working_dir: PathBuf,
    style: StyleSlot,
}

impl ParsedLayer {
    pub fn new(
        key: LayerKey,
        definition: LayerDefinition,
        fingerprint: Fingerprint,
        config: &GlobalConfig,
        working_dir: &Path,
    ) -> Self {
        Self {
            key,
            definition,
            fingerprint,
            cache: Arc::clone(config.cache()),
            log_level: config.log_level(),
            working_dir: working_dir.to_path_buf(),
            style: StyleSlot::new(),
        }
    }

    /// Re-tag the layer with the key it was looked up under.
    pub fn tagged(mut self, key: LayerKey) -> Self {
        self.key = key;
        self
    }

    pub fn key(&self) -> &LayerKey {
        &self.key
    }

    pub fn definition(&self) -> &LayerDefinition {
        &self.definition
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn cache(&self) -> &Arc<CacheBackendHandle> {
        &self.cache
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The compiled style, compiling it on first use.
    ///
    /// Returns `None` for providers that have no style document.
    pub fn style(&self) -> Option<Arc<CompiledStyle>> {
        let source = self.definition.style_source()?;
        let resolved = resolve_style_source(&self.working_dir, source);
        Some(self.style.get_or_compile(|| CompiledStyle {
            source: resolved,
            compiled_at: Utc::now(),
        }))
    }

    /// The compiled style if one is held, without compiling.
    pub fn compiled_style(&self) -> Option<Arc<CompiledStyle>> {
        self.style.current()
    }

    /// Clear the compiled style so the next `style()` call recompiles it.
    pub fn invalidate_style(&self) -> bool {
        self.style.clear()
    }

    pub fn style_compilations(&self) -> u64 {
        self.style.compilations()
    }
}

fn resolve_style_source(working_dir: &Path, source: &str) -> String {
    if source.starts_with("http://") || source.starts_with("https://") {
        return source.to_string();
    }
    let path = Path::new(source);
    if path.is_absolute() {
        source.to_string()
    } else {
        working_dir.join(path).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> GlobalConfig {
        GlobalConfig::new(
            "default",
            CacheBackendHandle::Test { verbose: false },
            LogLevel::Info,
            "/tmp/stache",
        )
    }

    fn layer(doc: serde_json::Value) -> ParsedLayer {
        let key = LayerKey::from("roads");
        let definition = LayerDefinition::from_value(&key, &doc).unwrap();
        let config = config();
        ParsedLayer::new(key, definition, "f".repeat(64), &config, config.working_dir())
    }

    #[test]
    fn test_style_compiles_once_until_invalidated() {
        let layer = layer(json!({"provider": {"name": "mapnik", "mapfile": "roads.xml"}}));
        assert!(layer.compiled_style().is_none());

        let first = layer.style().unwrap();
        assert_eq!(first.source, "/tmp/stache/roads.xml");
        let second = layer.style().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(layer.style_compilations(), 1);

        assert!(layer.invalidate_style());
        assert!(layer.compiled_style().is_none());
        assert!(!layer.invalidate_style());

        let third = layer.style().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(layer.style_compilations(), 2);
    }

    #[test]
    fn test_remote_and_absolute_style_sources_are_kept() {
        let remote = layer(json!({"provider": {"name": "mapnik", "mapfile": "http://example.com/s.xml"}}));
        assert_eq!(remote.style().unwrap().source, "http://example.com/s.xml");

        let absolute = layer(json!({"provider": {"name": "mapnik", "mapfile": "/srv/s.xml"}}));
        assert_eq!(absolute.style().unwrap().source, "/srv/s.xml");
    }

    #[test]
    fn test_non_mapnik_layer_has_no_style() {
        let layer = layer(json!({"provider": {"name": "proxy", "provider": "OPENSTREETMAP"}}));
        assert!(layer.style().is_none());
        assert!(!layer.invalidate_style());
    }

    #[test]
    fn test_tagged_replaces_key() {
        let layer = layer(json!({"provider": {"name": "mapnik", "mapfile": "a.xml"}}))
            .tagged(LayerKey::from("water"));
        assert_eq!(layer.key().as_str(), "water");
    }

    #[test]
    fn test_layers_share_cache_handle() {
        let config = config();
        let key = LayerKey::from("a");
        let definition =
            LayerDefinition::from_value(&key, &json!({"provider": {"name": "mapnik", "mapfile": "a.xml"}}))
                .unwrap();
        let a = ParsedLayer::new(key.clone(), definition.clone(), String::new(), &config, config.working_dir());
        let b = ParsedLayer::new(key, definition, String::new(), &config, config.working_dir());
        assert!(Arc::ptr_eq(a.cache(), b.cache()));
    }
}
