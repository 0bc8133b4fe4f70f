//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres and the
//! `LayerSource` implementation over the `tilestache_layer` and
//! `tilestache_config` tables.
//!
//! Every query is a prepared statement with bound parameters; keys and
//! configuration names are never interpolated into SQL text.

use crate::error::{db_error, pool_error};
use crate::settings::{env_var, parsed_var, required_var};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::fmt;
use std::time::Duration;
use tileconf_core::{
    ConfigError, ConfigRow, LayerKey, LayerRow, Revision, TileConfError, TileConfResult,
};
use tileconf_storage::LayerSource;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// QUERIES
// ============================================================================

pub const SELECT_LAYER_KEYS: &str = "SELECT key FROM tilestache_layer ORDER BY key";

pub const SELECT_LAYER_ROWS: &str =
    "SELECT key, value::text, updated::timestamptz FROM tilestache_layer ORDER BY key";

pub const SELECT_LAYER_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM tilestache_layer WHERE key = $1)";

pub const SELECT_LAYER_REVISION: &str =
    "SELECT updated::timestamptz FROM tilestache_layer WHERE key = $1";

pub const SELECT_LAYER_ROW: &str =
    "SELECT key, value::text, updated::timestamptz FROM tilestache_layer WHERE key = $1";

pub const SELECT_CONFIG_ROW: &str =
    "SELECT name, cache::text FROM tilestache_config WHERE name = $1";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Clone, PartialEq)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "tilestache".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            // One connection per worker process.
            max_size: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a database configuration from `TILESTACHE_DATABASE_*`
    /// environment variables.
    ///
    /// The database name and user are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: env_var("TILESTACHE_DATABASE_HOST").unwrap_or(defaults.host),
            port: parsed_var("TILESTACHE_DATABASE_PORT", defaults.port)?,
            dbname: required_var("TILESTACHE_DATABASE_NAME")?,
            user: required_var("TILESTACHE_DATABASE_USERNAME")?,
            password: std::env::var("TILESTACHE_DATABASE_PASSWORD").unwrap_or_default(),
            max_size: parsed_var("TILESTACHE_DATABASE_POOL_SIZE", defaults.max_size)?,
            timeout: Duration::from_secs(parsed_var(
                "TILESTACHE_DATABASE_TIMEOUT",
                defaults.timeout.as_secs(),
            )?),
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TILESTACHE_DATABASE_POOL_SIZE".to_string(),
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "TILESTACHE_DATABASE_TIMEOUT".to_string(),
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Create a connection pool from this configuration.
    ///
    /// No connection is opened until the first query.
    pub fn create_pool(&self) -> Result<Pool, deadpool_postgres::CreatePoolError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);
        cfg.pool = Some(PoolConfig::new(self.max_size));

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    }
}

// ============================================================================
// LAYER SOURCE
// ============================================================================

/// Layer source backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgLayerSource {
    pool: Pool,
}

impl PgLayerSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a source and its pool from configuration.
    pub fn from_config(config: &DbConfig) -> Result<Self, deadpool_postgres::CreatePoolError> {
        Ok(Self::new(config.create_pool()?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> TileConfResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

/// Columns of one `tilestache_layer` row; `value` may be NULL.
struct RawLayerRow {
    key: LayerKey,
    value: Option<String>,
    updated: Revision,
}

impl RawLayerRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        let key: String = row.try_get(0)?;
        let value: Option<String> = row.try_get(1)?;
        let updated: Option<DateTime<Utc>> = row.try_get(2)?;
        Ok(Self {
            key: LayerKey::from(key),
            value,
            updated: Revision::from(updated),
        })
    }

    /// A NULL value cannot be interpreted as a definition.
    fn into_layer_row(self) -> TileConfResult<LayerRow> {
        let value = layer_value(&self.key, self.value)?;
        Ok(LayerRow::new(self.key, value, self.updated))
    }
}

fn layer_value(key: &LayerKey, value: Option<String>) -> TileConfResult<String> {
    value.ok_or_else(|| TileConfError::malformed(key, "value is NULL"))
}

fn cache_text(config_name: &str, cache: Option<String>) -> TileConfResult<String> {
    cache.ok_or_else(|| TileConfError::invalid_cache_spec(config_name, "cache is NULL"))
}

#[async_trait]
impl LayerSource for PgLayerSource {
    async fn keys(&self) -> TileConfResult<Vec<LayerKey>> {
        let conn = self.get_conn().await?;
        let stmt = conn.prepare_cached(SELECT_LAYER_KEYS).await.map_err(db_error)?;
        let rows = conn.query(&stmt, &[]).await.map_err(db_error)?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map(LayerKey::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    async fn rows(&self) -> TileConfResult<Vec<LayerRow>> {
        let conn = self.get_conn().await?;
        let stmt = conn.prepare_cached(SELECT_LAYER_ROWS).await.map_err(db_error)?;
        let rows = conn.query(&stmt, &[]).await.map_err(db_error)?;
        // Listings keep NULL-valued rows visible as empty text.
        rows.iter()
            .map(|row| {
                RawLayerRow::from_row(row)
                    .map(|raw| LayerRow::new(raw.key, raw.value.unwrap_or_default(), raw.updated))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    async fn exists(&self, key: &LayerKey) -> TileConfResult<bool> {
        let conn = self.get_conn().await?;
        let stmt = conn.prepare_cached(SELECT_LAYER_EXISTS).await.map_err(db_error)?;
        let row = conn
            .query_one(&stmt, &[&key.as_str()])
            .await
            .map_err(db_error)?;
        row.try_get(0).map_err(db_error)
    }

    async fn revision(&self, key: &LayerKey) -> TileConfResult<Option<Revision>> {
        let conn = self.get_conn().await?;
        let stmt = conn
            .prepare_cached(SELECT_LAYER_REVISION)
            .await
            .map_err(db_error)?;
        let row = conn
            .query_opt(&stmt, &[&key.as_str()])
            .await
            .map_err(db_error)?;
        match row {
            Some(row) => {
                let updated: Option<DateTime<Utc>> = row.try_get(0).map_err(db_error)?;
                Ok(Some(Revision::from(updated)))
            }
            None => Ok(None),
        }
    }

    async fn fetch(&self, key: &LayerKey) -> TileConfResult<Option<LayerRow>> {
        let conn = self.get_conn().await?;
        let stmt = conn.prepare_cached(SELECT_LAYER_ROW).await.map_err(db_error)?;
        let row = conn
            .query_opt(&stmt, &[&key.as_str()])
            .await
            .map_err(db_error)?;
        match row {
            Some(row) => RawLayerRow::from_row(&row)
                .map_err(db_error)?
                .into_layer_row()
                .map(Some),
            None => Ok(None),
        }
    }

    async fn config(&self, name: &str) -> TileConfResult<Option<ConfigRow>> {
        let conn = self.get_conn().await?;
        let stmt = conn.prepare_cached(SELECT_CONFIG_ROW).await.map_err(db_error)?;
        let row = conn.query_opt(&stmt, &[&name]).await.map_err(db_error)?;
        match row {
            Some(row) => {
                let name: String = row.try_get(0).map_err(db_error)?;
                let cache: Option<String> = row.try_get(1).map_err(db_error)?;
                let cache = cache_text(&name, cache)?;
                Ok(Some(ConfigRow::new(name, cache)))
            }
            None => Ok(None),
        }
    }
}
