//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set. Otherwise the filter follows the configured log
//! level, which can be replaced once the configuration row has been read.

use crate::error::{BootstrapError, BootstrapResult};
use tileconf_core::LogLevel;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directive for a configured log level.
pub fn default_directive(level: LogLevel) -> String {
    let level = level.as_directive();
    format!("tileconf_storage={0},tileconf_pg={0},tileconf_check={0},warn", level)
}

/// Handle for adjusting the log filter after start-up.
pub struct TracingHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl TracingHandle {
    /// Switch to `level`. Has no effect when `RUST_LOG` controls the filter.
    pub fn set_level(&self, level: LogLevel) -> BootstrapResult<()> {
        if self.from_env {
            return Ok(());
        }
        self.filter
            .reload(EnvFilter::new(default_directive(level)))
            .map_err(|e| BootstrapError::Tracing(e.to_string()))
    }
}

/// Install the global JSON subscriber.
///
/// Call once at process start-up before anything is logged.
pub fn init_tracing(level: LogLevel) -> BootstrapResult<TracingHandle> {
    let (env_filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(default_directive(level)), false),
    };
    let (filter, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| BootstrapError::Tracing(e.to_string()))?;

    tracing::info!(log_level = %level, from_env, "tracing initialized");
    Ok(TracingHandle {
        filter: handle,
        from_env,
    })
}
