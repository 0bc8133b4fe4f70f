//! tileconf PostgreSQL - Layer Source and Process Bootstrap
//!
//! Provides the PostgreSQL-backed `LayerSource`, environment settings for a
//! worker process, and tracing initialization. The `tileconf-check` binary
//! ties them together to validate a database's layer definitions.

pub mod db;
pub mod error;
pub mod settings;
pub mod telemetry;

pub use db::{DbConfig, PgLayerSource};
pub use error::{BootstrapError, BootstrapResult};
pub use settings::{load_env_file, ServerSettings};
pub use telemetry::{init_tracing, TracingHandle};
