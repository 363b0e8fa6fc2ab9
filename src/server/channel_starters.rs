//! Channel adapter startup functions

use parley_channels::TelegramAdapter;
use parley_core::Pipeline;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Start the Telegram adapter.
///
/// An adapter that exits on its own (e.g. an invalid token) cancels
/// `shutdown` so the rest of the process stops with it.
pub fn start_telegram_adapter(
    adapter: Arc<TelegramAdapter>,
    pipeline: Arc<Pipeline>,
    shutdown: &CancellationToken,
) -> JoinHandle<()> {
    let telegram_shutdown = shutdown.clone();

    let handle = tokio::spawn(async move {
        let result = adapter.run(pipeline, telegram_shutdown.child_token()).await;
        if let Err(e) = result {
            error!("Telegram adapter error: {}", e);
        }
        if !telegram_shutdown.is_cancelled() {
            info!("Telegram adapter exited, shutting down");
            telegram_shutdown.cancel();
        }
    });

    info!("Telegram adapter started");
    handle
}
