//! tileconf Core - Layer Configuration Types
//!
//! Pure data structures shared by every other crate in the workspace: layer
//! keys and rows, typed layer definitions and cache specifications, the parsed
//! layer object, the global configuration, and the error taxonomy.
//! This crate performs no I/O.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub mod cache_spec;
pub mod config;
pub mod definition;
pub mod entities;
pub mod error;
pub mod layer;
pub mod parser;

pub use cache_spec::{CacheBackendHandle, CacheSpec, DirLayout};
pub use config::{CacheDocument, GlobalConfig, LogLevel, DEFAULT_CONFIG_NAME};
pub use definition::{
    Bounds, BoundsSpec, BuiltinProvider, CustomProvider, LayerDefinition, Metatile, Preview,
    ProviderSpec,
};
pub use entities::{ConfigRow, LayerKey, LayerRow, Revision};
pub use error::{ConfigError, DefinitionError, StorageError, TileConfError, TileConfResult};
pub use layer::{CompiledStyle, ParsedLayer, StyleSlot};
pub use parser::{CacheBackendParser, DefinitionParser, LayerParser, SpecParser};

// ============================================================================
// SHARED PRIMITIVES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Hex-encoded SHA-256 of a layer definition document.
pub type Fingerprint = String;

/// Compute the fingerprint of a definition's serialized form.
pub fn compute_fingerprint(content: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
