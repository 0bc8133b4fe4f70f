//! Error handling at the PostgreSQL and bootstrap boundaries.
//!
//! Driver errors never cross into the store: they are logged here with full
//! detail and surface as `StoreUnavailable` with a generic reason.

use std::path::PathBuf;
use thiserror::Error;
use tileconf_core::{ConfigError, TileConfError};

/// Failures while bringing a process up.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    TileConf(#[from] TileConfError),

    #[error("Failed to create connection pool: {0}")]
    Pool(#[from] deadpool_postgres::CreatePoolError),

    #[error("Failed to load environment file {path}: {reason}")]
    EnvFile { path: PathBuf, reason: String },

    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

impl From<ConfigError> for BootstrapError {
    fn from(err: ConfigError) -> Self {
        BootstrapError::TileConf(err.into())
    }
}

/// Result type for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Convert a query error into `StoreUnavailable`.
pub(crate) fn db_error(err: tokio_postgres::Error) -> TileConfError {
    // Log the full error for debugging
    tracing::error!("Database error: {:?}", err);

    // Return a generic reason to avoid leaking internal details
    TileConfError::unavailable("database operation failed")
}

/// Convert a pool checkout error into `StoreUnavailable`.
pub(crate) fn pool_error(err: deadpool_postgres::PoolError) -> TileConfError {
    tracing::error!("Connection pool error: {:?}", err);

    match err {
        deadpool_postgres::PoolError::Timeout(_) => {
            TileConfError::unavailable("timed out waiting for a database connection")
        }
        deadpool_postgres::PoolError::Closed => {
            TileConfError::unavailable("database connection pool is closed")
        }
        _ => TileConfError::unavailable("failed to acquire database connection"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_pool_is_unavailable() {
        let err = pool_error(deadpool_postgres::PoolError::Closed);
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: BootstrapError = ConfigError::MissingRequired {
            field: "TILESTACHE_TMP_DIR".to_string(),
        }
        .into();
        assert!(matches!(err, BootstrapError::TileConf(TileConfError::Config(_))));
        assert!(err.to_string().contains("TILESTACHE_TMP_DIR"));
    }

    #[test]
    fn test_store_errors_are_transparent() {
        let err: BootstrapError = TileConfError::config_not_found("default").into();
        assert_eq!(err.to_string(), TileConfError::config_not_found("default").to_string());
    }
}
