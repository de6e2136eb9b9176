use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;

use config::{BusKind, Config};
use dbus_interface::{SeekerService, BUS_NAME, OBJECT_PATH};
use store::RecordStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("seekerd starting");

    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");

    let store = Arc::new(
        RecordStore::open(&config.db_path)
            .with_context(|| format!("opening record store at {}", config.db_path.display()))?,
    );
    tracing::info!(path = %config.db_path.display(), "record store opened");

    let engine = engine::spawn_engine(&config, Arc::clone(&store))?;

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, SeekerService::new(engine, store))?
        .build()
        .await?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "seekerd ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("seekerd shutting down");

    Ok(())
}
