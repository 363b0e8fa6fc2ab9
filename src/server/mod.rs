//! Server module for Parley
//!
//! Wires the record store, session manager, dispatch pipeline and the
//! Telegram adapter together and runs them until Ctrl+C.

mod channel_starters;
pub mod config;
pub mod loader;

pub use config::{AppConfig, StoreBackend, StoreSection};
pub use loader::load_config;

use anyhow::{Context, Result};
use channel_starters::start_telegram_adapter;
use parley_channels::{TelegramAdapter, TelegramTransport};
use parley_core::{
    Locale, MemoryRecordStore, Pipeline, RecordStore, SessionManager, SqliteRecordStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long in-flight work may take to finish on shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the configured record store
pub async fn open_store(section: &StoreSection) -> Result<Arc<dyn RecordStore>> {
    match section.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory record store; records are lost on exit");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
        StoreBackend::Sqlite => {
            let store = match section.sqlite_path() {
                Some(path) => SqliteRecordStore::new(path).await,
                None => SqliteRecordStore::new_default().await,
            }
            .context("Failed to open SQLite record store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Run the bot until interrupted
pub async fn run(config: AppConfig) -> Result<()> {
    let telegram_config = config.telegram_config()?;

    let store = open_store(&config.store).await?;
    let manager = SessionManager::new(store, config.session_config());

    let shutdown = CancellationToken::new();
    let sweeper = manager.spawn_sweeper(config.cache.sweep_interval(), shutdown.child_token());

    let adapter = Arc::new(TelegramAdapter::new(telegram_config));
    let transport = Arc::new(TelegramTransport::from_adapter(&adapter));
    let pipeline = Arc::new(
        Pipeline::builder(manager.clone(), transport)
            .router(crate::bot::router(
                manager.clone(),
                config.admin.user_ids.clone(),
            ))
            .locale(Locale::new(&config.language.default))
            .config(config.dispatch_config())
            .build(),
    );

    let telegram = start_telegram_adapter(adapter, pipeline, &shutdown);
    info!("Parley is running. Press Ctrl+C to stop");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, telegram).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Telegram adapter task failed: {}", e),
        Err(_) => warn!("Telegram adapter shutdown timeout"),
    }
    if let Err(e) = sweeper.await {
        warn!("Session sweeper task failed: {}", e);
    }

    manager.shutdown(SHUTDOWN_TIMEOUT).await;
    info!(
        applied = manager.writer().applied(),
        dropped = manager.writer().dropped(),
        "Parley shutdown complete"
    );
    Ok(())
}
