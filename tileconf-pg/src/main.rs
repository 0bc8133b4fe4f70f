//! tileconf-check
//!
//! Opens the layer store against the configured database, parses every
//! layer, and exits non-zero when any definition fails to parse.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tileconf_pg::{
    init_tracing, load_env_file, BootstrapResult, DbConfig, PgLayerSource, ServerSettings,
};
use tileconf_storage::LayerStore;

#[derive(Debug, Parser)]
#[command(name = "tileconf-check", version, about = "Validate layer definitions stored in PostgreSQL")]
struct Cli {
    /// Dotenv file to load before reading the environment
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Configuration row to load (overrides TILESTACHE_CONFIG_NAME)
    #[arg(long, value_name = "NAME")]
    config_name: Option<String>,

    /// Open the store without parsing every layer
    #[arg(long)]
    no_warm: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("tileconf-check: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every layer parsed.
async fn run(cli: Cli) -> BootstrapResult<bool> {
    let env_file = load_env_file(cli.env_file.as_deref())?;

    let mut settings = ServerSettings::from_env()?;
    if let Some(name) = cli.config_name {
        settings.config_name = name;
    }
    if cli.no_warm {
        settings.warm_on_start = false;
    }
    settings.validate()?;

    let log_handle = init_tracing(settings.log_level)?;
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }

    let db_config = DbConfig::from_env()?;
    db_config.validate()?;
    tracing::info!(
        host = %db_config.host,
        port = db_config.port,
        dbname = %db_config.dbname,
        "connecting to layer database"
    );
    let source = PgLayerSource::from_config(&db_config)?;

    let store = LayerStore::open(source, &settings.store_options()).await?;
    log_handle.set_level(store.config().log_level())?;

    let keys = store.keys().await?;
    tracing::info!(
        config_name = %store.config().name(),
        cache = store.config().cache().kind(),
        layers = keys.len(),
        ?keys,
        "layer store opened"
    );

    if !settings.warm_on_start {
        return Ok(true);
    }

    let report = store.warm().await?;
    for (key, error) in &report.failed {
        tracing::error!(key = %key, error = %error, "layer definition rejected");
    }
    Ok(report.is_clean())
}
