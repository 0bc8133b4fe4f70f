//! Process settings read from the environment.

use crate::error::{BootstrapError, BootstrapResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tileconf_core::{ConfigError, LogLevel, DEFAULT_CONFIG_NAME};
use tileconf_storage::StoreOptions;

// ============================================================================
// ENVIRONMENT HELPERS
// ============================================================================

/// Value of `key`, treating empty values as unset.
pub(crate) fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn required_var(key: &str) -> Result<String, ConfigError> {
    env_var(key).ok_or_else(|| ConfigError::MissingRequired {
        field: key.to_string(),
    })
}

pub(crate) fn parsed_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn flag_var(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

/// Load variables from a dotenv file.
///
/// With an explicit path the file must exist. Without one, a `.env` in the
/// current directory or its parents is loaded if present.
pub fn load_env_file(path: Option<&Path>) -> BootstrapResult<Option<PathBuf>> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| BootstrapError::EnvFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(BootstrapError::EnvFile {
                path: PathBuf::from(".env"),
                reason: e.to_string(),
            }),
        },
    }
}

// ============================================================================
// SERVER SETTINGS
// ============================================================================

/// Settings for one worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    /// Default working directory for layers.
    pub working_dir: PathBuf,
    /// Default log level.
    pub log_level: LogLevel,
    /// Configuration row to load.
    pub config_name: String,
    /// Parse every layer before serving.
    pub warm_on_start: bool,
}

impl ServerSettings {
    /// Read settings from the `TILESTACHE_*` environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let working_dir = PathBuf::from(required_var("TILESTACHE_TMP_DIR")?);
        let log_level = match env_var("TILESTACHE_LOG_LEVEL") {
            None => LogLevel::default(),
            Some(raw) => raw.parse::<LogLevel>().map_err(|e| match e {
                ConfigError::InvalidValue { value, reason, .. } => ConfigError::InvalidValue {
                    field: "TILESTACHE_LOG_LEVEL".to_string(),
                    value,
                    reason,
                },
                other => other,
            })?,
        };
        let config_name =
            env_var("TILESTACHE_CONFIG_NAME").unwrap_or_else(|| DEFAULT_CONFIG_NAME.to_string());
        let warm_on_start = flag_var("TILESTACHE_WARM_ON_START", true)?;

        Ok(Self {
            working_dir,
            log_level,
            config_name,
            warm_on_start,
        })
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.working_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "TILESTACHE_TMP_DIR".to_string(),
            });
        }
        if self.config_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "TILESTACHE_CONFIG_NAME".to_string(),
                value: self.config_name.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Store options carrying these settings as defaults.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::new()
            .with_config_name(self.config_name.clone())
            .with_working_dir(self.working_dir.clone())
            .with_log_level(self.log_level)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serializes tests that touch the process environment.
    pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        pub(crate) fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_settings_defaults() {
        let _lock = env_lock();
        let _dir = EnvVarGuard::set("TILESTACHE_TMP_DIR", Some("/tmp/stache"));
        let _level = EnvVarGuard::set("TILESTACHE_LOG_LEVEL", None);
        let _name = EnvVarGuard::set("TILESTACHE_CONFIG_NAME", None);
        let _warm = EnvVarGuard::set("TILESTACHE_WARM_ON_START", None);

        let settings = ServerSettings::from_env().unwrap();
        assert_eq!(settings.working_dir, PathBuf::from("/tmp/stache"));
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.config_name, "default");
        assert!(settings.warm_on_start);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_overrides() {
        let _lock = env_lock();
        let _dir = EnvVarGuard::set("TILESTACHE_TMP_DIR", Some("/var/tiles"));
        let _level = EnvVarGuard::set("TILESTACHE_LOG_LEVEL", Some("warning"));
        let _name = EnvVarGuard::set("TILESTACHE_CONFIG_NAME", Some("staging"));
        let _warm = EnvVarGuard::set("TILESTACHE_WARM_ON_START", Some("no"));

        let settings = ServerSettings::from_env().unwrap();
        assert_eq!(settings.log_level, LogLevel::Warning);
        assert_eq!(settings.config_name, "staging");
        assert!(!settings.warm_on_start);

        let options = settings.store_options();
        assert_eq!(options.config_name, "staging");
        assert_eq!(options.working_dir, PathBuf::from("/var/tiles"));
        assert_eq!(options.log_level, LogLevel::Warning);
    }

    #[test]
    fn test_missing_tmp_dir() {
        let _lock = env_lock();
        let _dir = EnvVarGuard::set("TILESTACHE_TMP_DIR", Some("  "));
        assert_eq!(
            ServerSettings::from_env().unwrap_err(),
            ConfigError::MissingRequired {
                field: "TILESTACHE_TMP_DIR".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let _lock = env_lock();
        let _dir = EnvVarGuard::set("TILESTACHE_TMP_DIR", Some("/tmp"));
        let _warm = EnvVarGuard::set("TILESTACHE_WARM_ON_START", None);
        let _level = EnvVarGuard::set("TILESTACHE_LOG_LEVEL", Some("chatty"));
        match ServerSettings::from_env().unwrap_err() {
            ConfigError::InvalidValue { field, value, .. } => {
                assert_eq!(field, "TILESTACHE_LOG_LEVEL");
                assert_eq!(value, "chatty");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }

        let _level = EnvVarGuard::set("TILESTACHE_LOG_LEVEL", None);
        let _warm = EnvVarGuard::set("TILESTACHE_WARM_ON_START", Some("maybe"));
        assert!(ServerSettings::from_env().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_config_name() {
        let settings = ServerSettings {
            working_dir: PathBuf::from("/tmp"),
            log_level: LogLevel::Info,
            config_name: " ".to_string(),
            warm_on_start: true,
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parsed_var_reports_bad_numbers() {
        let _lock = env_lock();
        let _port = EnvVarGuard::set("TILESTACHE_TEST_NUMBER", Some("eighty"));
        let err = parsed_var::<u16>("TILESTACHE_TEST_NUMBER", 80).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "TILESTACHE_TEST_NUMBER"));

        let _port = EnvVarGuard::set("TILESTACHE_TEST_NUMBER", None);
        assert_eq!(parsed_var::<u16>("TILESTACHE_TEST_NUMBER", 80).unwrap(), 80);
    }

    #[test]
    fn test_explicit_env_file_must_exist() {
        let err = load_env_file(Some(Path::new("/nonexistent/tileconf.env"))).unwrap_err();
        assert!(matches!(err, BootstrapError::EnvFile { .. }));
    }
}
