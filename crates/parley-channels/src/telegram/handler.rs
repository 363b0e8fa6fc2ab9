//! Telegram update handler and bot runner

use super::adapter::TelegramAdapter;
use crate::error::{Error, Result};
use parley_core::{Event, Pipeline};
use std::sync::Arc;
use std::time::Duration;
use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message as TelegramMessage},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

impl TelegramAdapter {
    /// Poll for updates and feed them through `pipeline` until `shutdown` fires
    #[instrument(skip_all)]
    pub async fn run(
        self: Arc<Self>,
        pipeline: Arc<Pipeline>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        self.config.validate()?;
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| Error::Telegram(e.to_string()))?;
        info!(username = ?me.username, "Starting Telegram bot");

        let message_handler = Update::filter_message().endpoint({
            let adapter = self.clone();
            let pipeline = pipeline.clone();
            move |msg: TelegramMessage| {
                let event = adapter.event_from_message(&msg);
                let pipeline = pipeline.clone();
                async move {
                    Self::dispatch(&pipeline, event).await;
                    respond(())
                }
            }
        });

        let callback_handler = Update::filter_callback_query().endpoint({
            let adapter = self.clone();
            let pipeline = pipeline.clone();
            move |query: CallbackQuery| {
                let adapter = adapter.clone();
                let pipeline = pipeline.clone();
                async move {
                    match adapter.event_from_callback(&query) {
                        Some(event) => Self::dispatch(&pipeline, Some(event)).await,
                        None => adapter.acknowledge_callback(&query).await,
                    }
                    respond(())
                }
            }
        });

        let handler = dptree::entry()
            .branch(message_handler)
            .branch(callback_handler);

        // Unique distribution key per update: updates run concurrently and the
        // session lock serializes those from the same correspondent.
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .distribution_function(|_| None::<std::convert::Infallible>)
            .default_handler(|update| async move {
                debug!(update_id = ?update.id, "Ignoring unsupported update");
            })
            .build();

        let shutdown_token = dispatcher.shutdown_token();
        let watcher = tokio::spawn(async move {
            shutdown.cancelled().await;
            info!("Stopping Telegram bot");
            loop {
                match shutdown_token.shutdown() {
                    Ok(stopped) => {
                        stopped.await;
                        break;
                    }
                    // The dispatcher has not started polling yet.
                    Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
                }
            }
        });

        dispatcher.dispatch().await;
        watcher.abort();

        info!("Telegram bot stopped");
        Ok(())
    }

    async fn dispatch(pipeline: &Pipeline, event: Option<Event>) {
        let Some(event) = event else {
            return;
        };
        let chat_id = event.chat_id;
        let kind = event.kind_name();
        let outcome = pipeline.dispatch(event).await;
        debug!(chat_id, kind, outcome = ?outcome, "Update dispatched");
    }
}
