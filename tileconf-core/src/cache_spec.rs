//! Typed tile cache specifications
//!
//! A configuration row's `cache` document names one tile cache backend.
//! `CacheSpec` is the document as written; `CacheBackendHandle` is the
//! resolved form handed to every parsed layer, with relative paths anchored
//! to the working directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_GZIP: [&str; 4] = ["txt", "text", "json", "xml"];

// ============================================================================
// CACHE SPEC (as written)
// ============================================================================

/// Cache backend specification, tagged by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum CacheSpec {
    #[serde(rename = "Test", alias = "test")]
    Test {
        #[serde(default)]
        verbose: bool,
    },

    #[serde(rename = "Disk", alias = "disk")]
    Disk {
        path: String,
        /// Octal permission mask, e.g. "0022".
        #[serde(default)]
        umask: Option<String>,
        #[serde(default)]
        dirs: DirLayout,
        #[serde(default = "default_gzip")]
        gzip: Vec<String>,
    },

    #[serde(rename = "Multi", alias = "multi")]
    Multi { tiers: Vec<CacheSpec> },

    #[serde(rename = "Memcache", alias = "memcache")]
    Memcache {
        #[serde(default = "default_memcache_servers")]
        servers: Vec<String>,
        #[serde(default)]
        revision: u32,
        #[serde(rename = "key prefix", default)]
        key_prefix: String,
    },

    #[serde(rename = "Redis", alias = "redis")]
    Redis {
        #[serde(default = "default_redis_host")]
        host: String,
        #[serde(default = "default_redis_port")]
        port: u16,
        #[serde(default)]
        db: u32,
        #[serde(rename = "key prefix", default)]
        key_prefix: String,
    },

    #[serde(rename = "S3", alias = "s3")]
    S3 {
        bucket: String,
        #[serde(default)]
        access: Option<String>,
        #[serde(default)]
        secret: Option<String>,
        #[serde(default = "default_true")]
        use_locks: bool,
        #[serde(default)]
        path: String,
        #[serde(default)]
        reduced_redundancy: bool,
    },
}

fn default_gzip() -> Vec<String> {
    DEFAULT_GZIP.iter().map(|s| s.to_string()).collect()
}

fn default_memcache_servers() -> Vec<String> {
    vec!["127.0.0.1:11211".to_string()]
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_true() -> bool {
    true
}

/// Directory layout of the disk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirLayout {
    #[default]
    Safe,
    Portable,
    Quadtile,
}

impl CacheSpec {
    /// Resolve this specification against the working directory.
    ///
    /// Returns a human-readable reason on failure; callers wrap it into
    /// `InvalidCacheSpec` with the configuration name.
    pub fn resolve(self, working_dir: &Path) -> Result<CacheBackendHandle, String> {
        match self {
            CacheSpec::Test { verbose } => Ok(CacheBackendHandle::Test { verbose }),
            CacheSpec::Disk {
                path,
                umask,
                dirs,
                gzip,
            } => {
                if path.trim().is_empty() {
                    return Err("Disk cache path must not be empty".to_string());
                }
                let umask = match umask {
                    Some(raw) => u32::from_str_radix(raw.trim(), 8)
                        .map_err(|_| format!("umask '{}' is not an octal number", raw))?,
                    None => 0o022,
                };
                Ok(CacheBackendHandle::Disk {
                    root: anchor(working_dir, &path),
                    umask,
                    dirs,
                    gzip,
                })
            }
            CacheSpec::Multi { tiers } => {
                if tiers.is_empty() {
                    return Err("Multi cache needs at least one tier".to_string());
                }
                let tiers = tiers
                    .into_iter()
                    .map(|tier| tier.resolve(working_dir))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CacheBackendHandle::Multi { tiers })
            }
            CacheSpec::Memcache {
                servers,
                revision,
                key_prefix,
            } => {
                if servers.is_empty() {
                    return Err("Memcache cache needs at least one server".to_string());
                }
                Ok(CacheBackendHandle::Memcache {
                    servers,
                    revision,
                    key_prefix,
                })
            }
            CacheSpec::Redis {
                host,
                port,
                db,
                key_prefix,
            } => Ok(CacheBackendHandle::Redis {
                host,
                port,
                db,
                key_prefix,
            }),
            CacheSpec::S3 {
                bucket,
                access,
                secret,
                use_locks,
                path,
                reduced_redundancy,
            } => {
                if bucket.trim().is_empty() {
                    return Err("S3 cache bucket must not be empty".to_string());
                }
                if access.is_some() != secret.is_some() {
                    return Err("S3 cache needs both 'access' and 'secret' or neither".to_string());
                }
                Ok(CacheBackendHandle::S3 {
                    bucket,
                    access,
                    secret,
                    use_locks,
                    path,
                    reduced_redundancy,
                })
            }
        }
    }
}

fn anchor(working_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

// ============================================================================
// CACHE BACKEND HANDLE (resolved)
// ============================================================================

/// A resolved cache backend, shared by every layer of one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendHandle {
    Test {
        verbose: bool,
    },
    Disk {
        root: PathBuf,
        umask: u32,
        dirs: DirLayout,
        gzip: Vec<String>,
    },
    Multi {
        tiers: Vec<CacheBackendHandle>,
    },
    Memcache {
        servers: Vec<String>,
        revision: u32,
        key_prefix: String,
    },
    Redis {
        host: String,
        port: u16,
        db: u32,
        key_prefix: String,
    },
    S3 {
        bucket: String,
        access: Option<String>,
        secret: Option<String>,
        use_locks: bool,
        path: String,
        reduced_redundancy: bool,
    },
}

impl CacheBackendHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheBackendHandle::Test { .. } => "test",
            CacheBackendHandle::Disk { .. } => "disk",
            CacheBackendHandle::Multi { .. } => "multi",
            CacheBackendHandle::Memcache { .. } => "memcache",
            CacheBackendHandle::Redis { .. } => "redis",
            CacheBackendHandle::S3 { .. } => "s3",
        }
    }
}
