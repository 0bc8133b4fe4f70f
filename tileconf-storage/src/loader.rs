//! Global configuration loading.

use crate::LayerSource;
use std::path::PathBuf;
use tileconf_core::{
    CacheBackendParser, CacheDocument, GlobalConfig, LogLevel, TileConfError, TileConfResult,
    DEFAULT_CONFIG_NAME,
};
use tracing::info;

/// Caller-supplied defaults for opening a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    /// Name of the configuration row to load.
    pub config_name: String,
    /// Working directory used when the configuration row names none.
    pub working_dir: PathBuf,
    /// Log level used when the configuration row names none.
    pub log_level: LogLevel,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            working_dir: std::env::temp_dir(),
            log_level: LogLevel::default(),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_name(mut self, name: impl Into<String>) -> Self {
        self.config_name = name.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

/// Read the configuration row named in `options` and build the global
/// configuration from it.
///
/// The row's `path` takes precedence over `options.working_dir` (except for
/// S3, where `path` is the key prefix) and its `loglevel` over
/// `options.log_level`. A `loglevel` in the row always wins, even when the
/// caller asked for a different level. Fails with `ConfigNotFound` when no
/// row matches and with `InvalidCacheSpec` when the cache document cannot be
/// interpreted.
pub async fn load_global_config<S, C>(
    source: &S,
    cache_parser: &C,
    options: &StoreOptions,
) -> TileConfResult<GlobalConfig>
where
    S: LayerSource + ?Sized,
    C: CacheBackendParser + ?Sized,
{
    let name = options.config_name.as_str();
    let row = source
        .config(name)
        .await?
        .ok_or_else(|| TileConfError::config_not_found(name))?;

    let mut document = CacheDocument::parse(name, &row.cache)?;
    let working_dir = document.resolve_working_dir(&options.working_dir);
    let cache = cache_parser.parse_cache_backend(name, &document.spec, &working_dir)?;
    let log_level = document.log_level.unwrap_or(options.log_level);

    info!(
        config_name = %name,
        cache = cache.kind(),
        log_level = %log_level,
        working_dir = %working_dir.display(),
        "global configuration loaded"
    );

    Ok(GlobalConfig::new(name, cache, log_level, working_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockLayerSource;
    use std::path::Path;
    use tileconf_core::{CacheBackendHandle, SpecParser, StorageError};

    fn options() -> StoreOptions {
        StoreOptions::new()
            .with_working_dir("/tmp/stache")
            .with_log_level(LogLevel::Warning)
    }

    #[tokio::test]
    async fn test_loads_default_config() {
        let source = MockLayerSource::with_config("default", r#"{"name": "Test"}"#);
        let config = load_global_config(&source, &SpecParser, &options()).await.unwrap();
        assert_eq!(config.name(), "default");
        assert_eq!(config.cache().kind(), "test");
        assert_eq!(config.log_level(), LogLevel::Warning);
        assert_eq!(config.working_dir(), Path::new("/tmp/stache"));
    }

    #[tokio::test]
    async fn test_row_path_and_loglevel_override_defaults() {
        let source = MockLayerSource::with_config(
            "default",
            r#"{"name": "Disk", "path": "/srv/tiles", "loglevel": "DEBUG"}"#,
        );
        let config = load_global_config(&source, &SpecParser, &options()).await.unwrap();
        assert_eq!(config.working_dir(), Path::new("/srv/tiles"));
        assert_eq!(config.log_level(), LogLevel::Debug);
        assert!(matches!(
            config.cache().as_ref(),
            CacheBackendHandle::Disk { root, .. } if root == Path::new("/srv/tiles")
        ));
    }

    #[tokio::test]
    async fn test_s3_path_is_not_a_working_dir() {
        let source = MockLayerSource::with_config(
            "default",
            r#"{"name": "S3", "bucket": "tiles", "path": "v1/osm"}"#,
        );
        let config = load_global_config(&source, &SpecParser, &options()).await.unwrap();
        assert_eq!(config.working_dir(), Path::new("/tmp/stache"));
        match config.cache().as_ref() {
            CacheBackendHandle::S3 { bucket, path, .. } => {
                assert_eq!(bucket, "tiles");
                assert_eq!(path, "v1/osm");
            }
            other => panic!("expected S3 backend, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_named_config_is_selected() {
        let source = MockLayerSource::with_config("default", r#"{"name": "Test"}"#);
        source.insert_config("staging", r#"{"name": "Redis", "db": 2}"#);
        let config = load_global_config(&source, &SpecParser, &options().with_config_name("staging"))
            .await
            .unwrap();
        assert_eq!(config.name(), "staging");
        assert_eq!(config.cache().kind(), "redis");
    }

    #[tokio::test]
    async fn test_missing_config_row() {
        let source = MockLayerSource::with_config("default", r#"{"name": "Test"}"#);
        let err = load_global_config(&source, &SpecParser, &options().with_config_name("prod"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TileConfError::Storage(StorageError::ConfigNotFound {
                config_name: "prod".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_cache_spec_is_eager() {
        let source = MockLayerSource::with_config("default", r#"{"name": "Multi", "tiers": []}"#);
        let err = load_global_config(&source, &SpecParser, &options()).await.unwrap_err();
        assert!(err.is_definition_error());
    }

    #[tokio::test]
    async fn test_unavailable_source_is_not_config_not_found() {
        let source = MockLayerSource::with_config("default", r#"{"name": "Test"}"#);
        source.set_unavailable(true);
        let err = load_global_config(&source, &SpecParser, &options()).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
