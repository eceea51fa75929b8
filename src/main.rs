//! images-api server entry point.
//!
//! Loads configuration, connects the database, serves until SIGINT or
//! SIGTERM, then drains within `SERVER_TIMEOUT`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;

use images_api::api;
use images_api::app_state::AppState;
use images_api::config::{ConfigLoader, LoggerConfig};
use images_api::lifecycle::{Server, ShutdownToken, signals};
use images_api::logging;
use images_api::persistence::{Database, Direction, DirectorySource};
use images_api::service::ImageService;

#[derive(Debug, Parser)]
#[command(name = "images-api", version, about = "Images RPC service")]
struct Cli {
    /// Load environment variables from a dotenv file before reading
    /// configuration. Without a value, `.env` is used.
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = ".env")]
    dotenv: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dotenv = cli
        .dotenv
        .map(|path| dotenvy::from_path(&path).map_err(|e| (path, e)));

    let loader = ConfigLoader::from_process_env();
    let logger = loader.initialize::<LoggerConfig>()?;
    logging::init(&logger)?;

    if let Some(Err((path, e))) = dotenv {
        tracing::warn!(path = %path.display(), error = %e, "unable to load dotenv file");
    }

    let modules = loader.initialize_all()?;
    tracing::info!(
        port = modules.server.port,
        healthcheck_path = %modules.healthcheck.path,
        "starting images-api"
    );

    let database = Database::connect(&modules.database).await?;
    if modules.database.migrations_run
        && let Some(dir) = &modules.database.migrations_dir
    {
        let applied = database
            .apply_migrations(Direction::Up, &DirectorySource::new(dir), None)
            .await
            .context("running migrations")?;
        tracing::info!(applied, dir = %dir.display(), "migrations up to date");
    }

    let images = ImageService::new(Arc::clone(&modules.images));
    let state = AppState {
        probe: Arc::new(database.clone()),
        rpc_timeout: images.timeout(),
        images: Arc::new(images),
        startup_time: Utc::now(),
    };
    let dispatcher = api::build_dispatcher(state, &modules.healthcheck.path)?;

    let timeouts = modules.server.timeouts();
    let mut server = Server::start(dispatcher.into_router(), modules.server.address(), timeouts).await?;

    let token = ShutdownToken::new();
    tokio::spawn(signals::shutdown_on_signal(token.clone()));
    server.wait_for_shutdown(&token).await;

    let result = server.shutdown(timeouts.grace).await;
    database.close().await;

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_recoverable() => {
            tracing::warn!(error = %e, "forced shutdown");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
