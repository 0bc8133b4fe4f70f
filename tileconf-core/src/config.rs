//! Global configuration types

use crate::{CacheBackendHandle, ConfigError, TileConfError, TileConfResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Configuration row selected when the caller does not name one.
pub const DEFAULT_CONFIG_NAME: &str = "default";

// ============================================================================
// LOG LEVEL
// ============================================================================

/// Log verbosity shared by the store and every layer it parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// The equivalent `tracing` filter directive.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(ConfigError::InvalidValue {
                field: "loglevel".to_string(),
                value: s.to_string(),
                reason: "expected one of TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL"
                    .to_string(),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

// ============================================================================
// CACHE DOCUMENT
// ============================================================================

/// The `cache` column of a configuration row, split into the backend
/// specification and the two store-level overrides that ride along with it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDocument {
    /// Backend specification with `loglevel` removed. `path` is removed too
    /// except for S3; a Disk backend gets its `path` back from
    /// `resolve_working_dir`.
    pub spec: Value,
    /// Working directory override.
    pub path: Option<PathBuf>,
    /// Log level override.
    pub log_level: Option<LogLevel>,
}

impl CacheDocument {
    /// Parse the raw `cache` text of the configuration row named `config_name`.
    pub fn parse(config_name: &str, text: &str) -> TileConfResult<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            TileConfError::invalid_cache_spec(config_name, format!("invalid JSON: {}", e))
        })?;

        let Value::Object(mut map) = value else {
            return Err(TileConfError::invalid_cache_spec(
                config_name,
                "cache specification must be a JSON object",
            ));
        };

        // An S3 backend's `path` is its key prefix, not a working directory.
        let path = match map.remove("path") {
            Some(prefix) if backend_is(&map, "s3") => {
                map.insert("path".to_string(), prefix);
                None
            }
            None | Some(Value::Null) => None,
            Some(Value::String(p)) if !p.trim().is_empty() => Some(PathBuf::from(p)),
            Some(other) => {
                return Err(TileConfError::invalid_cache_spec(
                    config_name,
                    format!("'path' must be a non-empty string, got {}", other),
                ))
            }
        };

        let log_level = match map.remove("loglevel") {
            None | Some(Value::Null) => None,
            Some(Value::String(level)) => Some(level.parse::<LogLevel>().map_err(|e| {
                TileConfError::invalid_cache_spec(config_name, e.to_string())
            })?),
            Some(other) => {
                return Err(TileConfError::invalid_cache_spec(
                    config_name,
                    format!("'loglevel' must be a string, got {}", other),
                ))
            }
        };

        Ok(Self {
            spec: Value::Object(map),
            path,
            log_level,
        })
    }

    /// Resolve the working directory: the row's `path` anchored to
    /// `default_dir`, or `default_dir` itself when the row has none.
    ///
    /// A Disk backend names its root with the same `path` key, so its spec is
    /// pinned to the resolved directory.
    pub fn resolve_working_dir(&mut self, default_dir: &Path) -> PathBuf {
        let working_dir = match &self.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => default_dir.join(p),
            None => default_dir.to_path_buf(),
        };

        if let Value::Object(map) = &mut self.spec {
            if self.path.is_some() && backend_is(map, "disk") {
                map.insert(
                    "path".to_string(),
                    Value::String(working_dir.to_string_lossy().into_owned()),
                );
            }
        }

        working_dir
    }
}

fn backend_is(map: &serde_json::Map<String, Value>, kind: &str) -> bool {
    map.get("name")
        .and_then(Value::as_str)
        .map(|name| name.eq_ignore_ascii_case(kind))
        .unwrap_or(false)
}

// ============================================================================
// GLOBAL CONFIG
// ============================================================================

/// Store-wide configuration, loaded once and immutable thereafter.
///
/// Every parsed layer shares the same cache backend handle.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    name: String,
    cache: Arc<CacheBackendHandle>,
    log_level: LogLevel,
    working_dir: PathBuf,
}

impl GlobalConfig {
    pub fn new(
        name: impl Into<String>,
        cache: CacheBackendHandle,
        log_level: LogLevel,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            cache: Arc::new(cache),
            log_level,
            working_dir: working_dir.into(),
        }
    }

    /// Name of the configuration row this was loaded from.
    pub fn name(&self) -> &str {
        &self.name
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
}
