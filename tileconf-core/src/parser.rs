//! Parsing collaborators
//!
//! The store never interprets documents itself; it hands them to a
//! `LayerParser` and a `CacheBackendParser`. The default implementations
//! interpret documents through the typed `LayerDefinition` and `CacheSpec`.

use crate::{
    compute_fingerprint, CacheBackendHandle, CacheSpec, GlobalConfig, LayerDefinition, LayerKey,
    ParsedLayer, TileConfError, TileConfResult,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Turns a layer definition document into a ready-to-use layer.
///
/// Implementations must fail with `MalformedLayerDefinition` when the
/// document cannot be interpreted.
pub trait LayerParser: Send + Sync {
    fn parse_layer(
        &self,
        key: &LayerKey,
        definition: &Value,
        config: &GlobalConfig,
        working_dir: &Path,
    ) -> TileConfResult<ParsedLayer>;
}

/// Turns a cache specification document into a cache backend handle.
///
/// Implementations must fail with `InvalidCacheSpec` when the document
/// cannot be interpreted.
pub trait CacheBackendParser: Send + Sync {
    fn parse_cache_backend(
        &self,
        config_name: &str,
        spec: &Value,
        working_dir: &Path,
    ) -> TileConfResult<CacheBackendHandle>;
}

/// Default layer parser backed by `LayerDefinition`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefinitionParser;

impl LayerParser for DefinitionParser {
    fn parse_layer(
        &self,
        key: &LayerKey,
        definition: &Value,
        config: &GlobalConfig,
        working_dir: &Path,
    ) -> TileConfResult<ParsedLayer> {
        let parsed = LayerDefinition::from_value(key, definition)?;
        let fingerprint = compute_fingerprint(definition.to_string().as_bytes());
        Ok(ParsedLayer::new(
            key.clone(),
            parsed,
            fingerprint,
            config,
            working_dir,
        ))
    }
}

/// Default cache parser backed by `CacheSpec`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecParser;

impl CacheBackendParser for SpecParser {
    fn parse_cache_backend(
        &self,
        config_name: &str,
        spec: &Value,
        working_dir: &Path,
    ) -> TileConfResult<CacheBackendHandle> {
        let spec = CacheSpec::deserialize(spec)
            .map_err(|e| TileConfError::invalid_cache_spec(config_name, e.to_string()))?;
        spec.resolve(working_dir)
            .map_err(|reason| TileConfError::invalid_cache_spec(config_name, reason))
    }
}
