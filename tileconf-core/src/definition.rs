//! Typed layer definitions
//!
//! The JSON document stored in a layer row uses the tile server's own
//! space-separated key names ("stale lock timeout", "png options", ...).
//! `LayerDefinition` mirrors that document field for field so that a row is
//! validated completely when it is parsed, not deep inside a rendering call.

use crate::{LayerKey, TileConfError, TileConfResult};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Highest zoom level a layer may declare.
pub const MAX_ZOOM: u8 = 31;

/// Projection used when a definition does not name one.
pub const DEFAULT_PROJECTION: &str = "spherical mercator";

// ============================================================================
// LAYER DEFINITION
// ============================================================================

/// A fully typed layer definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerDefinition {
    pub provider: ProviderSpec,

    #[serde(default = "default_projection")]
    pub projection: String,

    #[serde(default)]
    pub metatile: Metatile,

    /// Seconds a render lock may be held before it is considered abandoned.
    #[serde(rename = "stale lock timeout", default = "default_stale_lock_timeout")]
    pub stale_lock_timeout: u64,

    /// Seconds a cached tile stays valid; absent means forever.
    #[serde(rename = "cache lifespan", default)]
    pub cache_lifespan: Option<u64>,

    #[serde(rename = "write cache", default = "default_true")]
    pub write_cache: bool,

    #[serde(rename = "allowed origin", default)]
    pub allowed_origin: Option<String>,

    #[serde(rename = "maximum cache age", default)]
    pub max_cache_age: Option<u64>,

    /// Extension redirects, e.g. `{"jpg": "png"}`.
    #[serde(default)]
    pub redirects: BTreeMap<String, String>,

    #[serde(rename = "tile height", default = "default_tile_height")]
    pub tile_height: u32,

    #[serde(default)]
    pub bounds: Option<BoundsSpec>,

    #[serde(default)]
    pub preview: Option<Preview>,

    #[serde(rename = "jpeg options", default)]
    pub jpeg_options: Option<Map<String, Value>>,

    #[serde(rename = "png options", default)]
    pub png_options: Option<Map<String, Value>>,

    #[serde(rename = "pixel effect", default)]
    pub pixel_effect: Option<Value>,
}

fn default_projection() -> String {
    DEFAULT_PROJECTION.to_string()
}

fn default_stale_lock_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_tile_height() -> u32 {
    256
}

fn default_grid_scale() -> u32 {
    4
}

impl LayerDefinition {
    /// Interpret a JSON document as a layer definition and validate it.
    pub fn from_value(key: &LayerKey, document: &Value) -> TileConfResult<Self> {
        let definition = Self::deserialize(document)
            .map_err(|e| TileConfError::malformed(key, e.to_string()))?;
        definition.validate(key)?;
        Ok(definition)
    }

    /// Check semantic constraints that the JSON shape alone cannot express.
    pub fn validate(&self, key: &LayerKey) -> TileConfResult<()> {
        self.provider.validate(key)?;

        if !is_known_projection(&self.projection) {
            return Err(invalid(
                key,
                "projection",
                format!(
                    "unknown projection '{}'; expected 'spherical mercator', 'WGS84' or 'module:Class'",
                    self.projection
                ),
            ));
        }

        if self.metatile.rows == 0 || self.metatile.columns == 0 {
            return Err(invalid(key, "metatile", "rows and columns must be at least 1"));
        }

        if self.tile_height == 0 {
            return Err(invalid(key, "tile height", "must be greater than 0"));
        }

        if let Some(bounds) = &self.bounds {
            for b in bounds.iter() {
                b.validate(key)?;
            }
        }

        if let Some(preview) = &self.preview {
            if preview.zoom > MAX_ZOOM {
                return Err(invalid(
                    key,
                    "preview.zoom",
                    format!("must be at most {}", MAX_ZOOM),
                ));
            }
        }

        Ok(())
    }

    /// The mapfile reference of a mapnik provider, if any.
    pub fn style_source(&self) -> Option<&str> {
        match &self.provider {
            ProviderSpec::Builtin(BuiltinProvider::Mapnik { mapfile, .. })
            | ProviderSpec::Builtin(BuiltinProvider::MapnikGrid { mapfile, .. }) => Some(mapfile),
            _ => None,
        }
    }
}

fn is_known_projection(projection: &str) -> bool {
    let lowered = projection.to_ascii_lowercase();
    lowered == "spherical mercator" || lowered == "wgs84" || projection.contains(':')
}

fn invalid(key: &LayerKey, field: &str, reason: impl std::fmt::Display) -> TileConfError {
    TileConfError::malformed(key, format!("{}: {}", field, reason))
}

// ============================================================================
// PROVIDERS
// ============================================================================

/// Tile provider selection: a built-in provider tagged by `name`, or a
/// custom provider identified by `class`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderSpec {
    Builtin(BuiltinProvider),
    Custom(CustomProvider),
}

impl<'de> Deserialize<'de> for ProviderSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.get("class").is_some() {
            CustomProvider::deserialize(value)
                .map(ProviderSpec::Custom)
                .map_err(de::Error::custom)
        } else {
            BuiltinProvider::deserialize(value)
                .map(ProviderSpec::Builtin)
                .map_err(de::Error::custom)
        }
    }
}

impl ProviderSpec {
    /// Short name used in logs.
    pub fn kind(&self) -> &str {
        match self {
            ProviderSpec::Builtin(BuiltinProvider::Mapnik { .. }) => "mapnik",
            ProviderSpec::Builtin(BuiltinProvider::Proxy { .. }) => "proxy",
            ProviderSpec::Builtin(BuiltinProvider::UrlTemplate { .. }) => "url template",
            ProviderSpec::Builtin(BuiltinProvider::Vector { .. }) => "vector",
            ProviderSpec::Builtin(BuiltinProvider::MapnikGrid { .. }) => "mapnik grid",
            ProviderSpec::Builtin(BuiltinProvider::MbTiles { .. }) => "mbtiles",
            ProviderSpec::Custom(custom) => &custom.class,
        }
    }

    fn validate(&self, key: &LayerKey) -> TileConfResult<()> {
        match self {
            ProviderSpec::Builtin(BuiltinProvider::Mapnik { mapfile, .. }) => {
                if mapfile.trim().is_empty() {
                    return Err(invalid(key, "provider.mapfile", "must not be empty"));
                }
            }
            ProviderSpec::Builtin(BuiltinProvider::MapnikGrid { mapfile, scale, .. }) => {
                if mapfile.trim().is_empty() {
                    return Err(invalid(key, "provider.mapfile", "must not be empty"));
                }
                if *scale == 0 {
                    return Err(invalid(key, "provider.scale", "must be at least 1"));
                }
            }
            ProviderSpec::Builtin(BuiltinProvider::MbTiles { tileset }) => {
                if tileset.trim().is_empty() {
                    return Err(invalid(key, "provider.tileset", "must not be empty"));
                }
            }
            ProviderSpec::Builtin(BuiltinProvider::Proxy { url, provider, .. }) => {
                if url.is_none() && provider.is_none() {
                    return Err(invalid(
                        key,
                        "provider",
                        "proxy needs either 'url' or 'provider'",
                    ));
                }
            }
            ProviderSpec::Builtin(BuiltinProvider::UrlTemplate { template, .. }) => {
                if template.trim().is_empty() {
                    return Err(invalid(key, "provider.template", "must not be empty"));
                }
            }
            ProviderSpec::Builtin(BuiltinProvider::Vector { driver, .. }) => {
                if driver.trim().is_empty() {
                    return Err(invalid(key, "provider.driver", "must not be empty"));
                }
            }
            ProviderSpec::Custom(custom) => {
                if !custom.class.contains(':') && !custom.class.contains('.') {
                    return Err(invalid(
                        key,
                        "provider.class",
                        format!("'{}' is not a qualified class path", custom.class),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Providers shipped with the tile server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum BuiltinProvider {
    #[serde(rename = "mapnik")]
    Mapnik {
        mapfile: String,
        #[serde(default)]
        fonts: Option<String>,
    },

    #[serde(rename = "proxy")]
    Proxy {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        provider: Option<String>,
        #[serde(default)]
        timeout: Option<f64>,
    },

    #[serde(rename = "url template")]
    UrlTemplate {
        template: String,
        #[serde(default)]
        referer: Option<String>,
    },

    /// UTFGrid interactivity rendered from a mapnik style.
    #[serde(rename = "mapnik grid")]
    MapnikGrid {
        mapfile: String,
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default)]
        layer_index: u32,
        #[serde(default = "default_grid_scale")]
        scale: u32,
        #[serde(default)]
        layer_id_key: Option<String>,
    },

    #[serde(rename = "mbtiles")]
    MbTiles { tileset: String },

    #[serde(rename = "vector")]
    Vector {
        driver: String,
        parameters: Map<String, Value>,
        #[serde(default)]
        properties: Option<Value>,
        #[serde(default)]
        clipped: Option<Value>,
    },
}

/// A provider loaded by class path, with free-form keyword arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomProvider {
    pub class: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

// ============================================================================
// METATILE, BOUNDS, PREVIEW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Metatile {
    pub rows: u32,
    pub columns: u32,
    pub buffer: u32,
}

impl Default for Metatile {
    fn default() -> Self {
        Self {
            rows: 1,
            columns: 1,
            buffer: 0,
        }
    }
}

/// One bounding box or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundsSpec {
    One(Bounds),
    Many(Vec<Bounds>),
}

impl BoundsSpec {
    pub fn iter(&self) -> std::slice::Iter<'_, Bounds> {
        match self {
            BoundsSpec::One(b) => std::slice::from_ref(b).iter(),
            BoundsSpec::Many(list) => list.iter(),
        }
    }
}

/// Geographic and zoom bounds outside which a layer renders nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Bounds {
    pub low: u8,
    pub high: u8,
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            low: 0,
            high: MAX_ZOOM,
            north: 89.0,
            west: -180.0,
            south: -89.0,
            east: 180.0,
        }
    }
}

impl Bounds {
    fn validate(&self, key: &LayerKey) -> TileConfResult<()> {
        if self.high > MAX_ZOOM {
            return Err(invalid(key, "bounds.high", format!("must be at most {}", MAX_ZOOM)));
        }
        if self.low > self.high {
            return Err(invalid(key, "bounds", "low zoom exceeds high zoom"));
        }
        if self.north <= self.south {
            return Err(invalid(key, "bounds", "north must be greater than south"));
        }
        if self.west >= self.east {
            return Err(invalid(key, "bounds", "west must be less than east"));
        }
        if self.north > 90.0 || self.south < -90.0 {
            return Err(invalid(key, "bounds", "latitude outside -90..90"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Preview {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
    pub ext: String,
}

impl Default for Preview {
    fn default() -> Self {
        Self {
            lat: 37.80,
            lon: -122.26,
            zoom: 10,
            ext: "png".to_string(),
        }
    }
}
