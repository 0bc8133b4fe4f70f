//! Error types for tileconf operations

use crate::LayerKey;
use thiserror::Error;

/// Backing store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Layer not found: {key}")]
    KeyNotFound { key: LayerKey },

    #[error("Configuration not found: {config_name}")]
    ConfigNotFound { config_name: String },
}

/// Errors interpreting persisted definitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Malformed layer definition for {key}: {reason}")]
    MalformedLayerDefinition { key: LayerKey, reason: String },

    #[error("Invalid cache specification in {config_name}: {reason}")]
    InvalidCacheSpec { config_name: String, reason: String },
}

/// Process configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all tileconf errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TileConfError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TileConfError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Storage(StorageError::StoreUnavailable {
            reason: reason.into(),
        })
    }

    pub fn key_not_found(key: &LayerKey) -> Self {
        Self::Storage(StorageError::KeyNotFound { key: key.clone() })
    }

    pub fn config_not_found(config_name: &str) -> Self {
        Self::Storage(StorageError::ConfigNotFound {
            config_name: config_name.to_string(),
        })
    }

    pub fn malformed(key: &LayerKey, reason: impl Into<String>) -> Self {
        Self::Definition(DefinitionError::MalformedLayerDefinition {
            key: key.clone(),
            reason: reason.into(),
        })
    }

    pub fn invalid_cache_spec(config_name: &str, reason: impl Into<String>) -> Self {
        Self::Definition(DefinitionError::InvalidCacheSpec {
            config_name: config_name.to_string(),
            reason: reason.into(),
        })
    }

    /// True when the requested layer does not exist; hosts answer "no such layer".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::KeyNotFound { .. }))
    }

    /// True for connection-level failures; hosts answer with a server error.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::StoreUnavailable { .. }))
    }

    pub fn is_definition_error(&self) -> bool {
        matches!(self, Self::Definition(_))
    }
}

/// Result type alias for tileconf operations.
pub type TileConfResult<T> = Result<T, TileConfError>;

// =============================================================================
// TESTS
// =============================================================================
