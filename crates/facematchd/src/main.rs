use anyhow::{Context, Result};
use facematch_core::FaceService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;

use config::Config;
use dbus_interface::{FaceMatchService, BUS_NAME, OBJECT_PATH};
use store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facematchd starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        model_dir = %config.model_dir.display(),
        db_path = %config.db_path.display(),
        threshold = config.match_threshold,
        "configuration loaded"
    );

    let store = SqliteStore::open(&config.db_path)
        .await
        .context("failed to open embedding store")?;

    let engine = engine::spawn_engine(
        &config.model_dir,
        config.detection_confidence,
        config.detect_timeout(),
    )
    .context("failed to start inference engine")?;

    // Serving without a gallery would report every face as unknown.
    let service = FaceService::open(Arc::new(engine), Arc::new(store), config.match_threshold)
        .await
        .context("failed to load gallery")?;

    let interface = FaceMatchService::new(
        Arc::new(service),
        config.import_per_label,
        config.model_dir.clone(),
        config.db_path.clone(),
    );

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, interface)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    let bus = if config.system_bus { "system" } else { "session" };
    tracing::info!(bus, name = BUS_NAME, "facematchd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facematchd shutting down");

    Ok(())
}
