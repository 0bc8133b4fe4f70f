//! tileconf Test Utilities
//!
//! Centralized test infrastructure for the tileconf workspace:
//! - Proptest generators for keys, definitions and revision histories
//! - A parse-counting parser probe
//! - Test fixtures for common scenarios
//! - Custom assertions for tileconf errors

// Re-export the mock source from its crate
pub use tileconf_storage::MockLayerSource;

// Re-export core types for convenience
pub use tileconf_core::{
    CacheBackendHandle, DefinitionError, DefinitionParser, GlobalConfig, LayerKey, LayerParser,
    LogLevel, ParsedLayer, Revision, StorageError, TileConfError, TileConfResult,
};

use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// PARSER PROBE
// ============================================================================

/// Layer parser wrapper that counts calls.
///
/// Clones share the counter, so a test can keep one clone while the store
/// owns the other.
#[derive(Debug, Clone, Default)]
pub struct CountingParser<P = DefinitionParser> {
    inner: P,
    calls: Arc<AtomicUsize>,
}

impl CountingParser<DefinitionParser> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P> CountingParser<P> {
    pub fn wrapping(inner: P) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `parse_layer` calls so far, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<P: LayerParser> LayerParser for CountingParser<P> {
    fn parse_layer(
        &self,
        key: &LayerKey,
        definition: &Value,
        config: &GlobalConfig,
        working_dir: &Path,
    ) -> TileConfResult<ParsedLayer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parse_layer(key, definition, config, working_dir)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating tileconf inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    /// Generate a layer key.
    pub fn arb_layer_key() -> impl Strategy<Value = LayerKey> {
        "[a-z][a-z0-9_-]{0,15}".prop_map(LayerKey::from)
    }

    /// Generate a set of distinct layer keys.
    pub fn arb_layer_keys(max: usize) -> impl Strategy<Value = Vec<LayerKey>> {
        prop::collection::btree_set("[a-z][a-z0-9_-]{0,15}", 1..=max)
            .prop_map(|keys| keys.into_iter().map(LayerKey::from).collect())
    }

    /// Generate a valid mapnik layer definition document.
    pub fn arb_layer_definition() -> impl Strategy<Value = Value> {
        (
            "[a-z]{1,12}\\.xml",
            prop_oneof![Just("spherical mercator"), Just("WGS84")],
            1u32..=4,
            0u32..=128,
        )
            .prop_map(|(mapfile, projection, size, buffer)| {
                json!({
                    "provider": {"name": "mapnik", "mapfile": mapfile},
                    "projection": projection,
                    "metatile": {"rows": size, "columns": size, "buffer": buffer},
                })
            })
    }

    /// Generate a valid layer definition as row text.
    pub fn arb_layer_definition_text() -> impl Strategy<Value = String> {
        arb_layer_definition().prop_map(|doc| doc.to_string())
    }

    /// Generate text that is not valid JSON.
    pub fn arb_malformed_text() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("{".to_string()),
            Just("provider = mapnik".to_string()),
            "\\{[a-z]{1,8}",
        ]
    }

    /// Generate a history of edits: `true` bumps the row's revision between
    /// two reads, `false` leaves it untouched.
    pub fn arb_edit_history(max: usize) -> impl Strategy<Value = Vec<bool>> {
        prop::collection::vec(any::<bool>(), 1..=max)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde_json::json;

    /// Cache document of the default configuration row.
    pub const TEST_CACHE: &str = r#"{"name": "Test"}"#;

    /// Cache document that moves the working directory and log level.
    pub const DISK_CACHE: &str =
        r#"{"name": "Disk", "path": "/srv/stache", "umask": "0002", "loglevel": "debug"}"#;

    /// A valid mapnik definition for the `roads` layer.
    pub fn roads_definition() -> String {
        json!({
            "provider": {"name": "mapnik", "mapfile": "styles/roads.xml"},
            "projection": "spherical mercator",
            "metatile": {"rows": 4, "columns": 4, "buffer": 64},
            "preview": {"lat": 37.80, "lon": -122.26, "zoom": 12, "ext": "png"},
        })
        .to_string()
    }

    /// The `roads` definition after an editor changed its style.
    pub fn roads_definition_v2() -> String {
        json!({
            "provider": {"name": "mapnik", "mapfile": "styles/roads-night.xml"},
            "projection": "spherical mercator",
            "metatile": {"rows": 4, "columns": 4, "buffer": 64},
        })
        .to_string()
    }

    /// A proxy layer with no style document.
    pub fn proxy_definition() -> String {
        json!({
            "provider": {"name": "proxy", "provider": "OPENSTREETMAP"},
            "write cache": false,
        })
        .to_string()
    }

    /// A source holding the default configuration row and nothing else.
    pub fn empty_source() -> Arc<MockLayerSource> {
        Arc::new(MockLayerSource::with_config(
            tileconf_core::DEFAULT_CONFIG_NAME,
            TEST_CACHE,
        ))
    }

    /// A source holding the default configuration, `roads` and `osm`.
    pub fn seeded_source() -> Arc<MockLayerSource> {
        let source = empty_source();
        source.update_layer("roads", roads_definition());
        source.update_layer("osm", proxy_definition());
        source
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for tileconf-specific errors.

    use super::*;

    /// Assert that a result is a `KeyNotFound` error for `key`.
    #[track_caller]
    pub fn assert_key_not_found<T: std::fmt::Debug>(result: &TileConfResult<T>, key: &str) {
        match result {
            Err(TileConfError::Storage(StorageError::KeyNotFound { key: k })) => {
                assert_eq!(k.as_str(), key, "Wrong key in KeyNotFound error");
            }
            other => panic!("Expected KeyNotFound for {}, got: {:?}", key, other),
        }
    }

    /// Assert that a result is a `MalformedLayerDefinition` error.
    #[track_caller]
    pub fn assert_malformed<T: std::fmt::Debug>(result: &TileConfResult<T>) {
        match result {
            Err(TileConfError::Definition(DefinitionError::MalformedLayerDefinition { .. })) => {}
            other => panic!("Expected MalformedLayerDefinition, got: {:?}", other),
        }
    }

    /// Assert that a result is a `ConfigNotFound` error.
    #[track_caller]
    pub fn assert_config_not_found<T: std::fmt::Debug>(result: &TileConfResult<T>) {
        match result {
            Err(TileConfError::Storage(StorageError::ConfigNotFound { .. })) => {}
            other => panic!("Expected ConfigNotFound, got: {:?}", other),
        }
    }
}
