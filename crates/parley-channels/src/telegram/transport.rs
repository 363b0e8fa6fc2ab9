//! Transport implementation for Telegram

use super::adapter::TelegramAdapter;
use async_trait::async_trait;
use parley_core::{
    CorrespondentId, MessageId as CoreMessageId, OutgoingMessage, ParseMode as CoreParseMode,
    Transport, TransportError,
};
use teloxide::{
    payloads::{AnswerCallbackQuerySetters, EditMessageTextSetters, SendMessageSetters},
    prelude::*,
    types::{CallbackQueryId, ChatId, MessageId, ParseMode},
    ApiError, RequestError,
};
use tracing::debug;

/// Classify a teloxide failure
pub fn map_request_error(error: RequestError) -> TransportError {
    match error {
        RequestError::Api(ApiError::MessageNotModified) => TransportError::NotModified,
        RequestError::Api(
            ApiError::MessageToDeleteNotFound
            | ApiError::MessageToEditNotFound
            | ApiError::MessageIdInvalid
            | ApiError::ChatNotFound,
        ) => TransportError::NotFound,
        RequestError::Api(ApiError::BotBlocked | ApiError::UserDeactivated) => {
            TransportError::Blocked
        }
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        RequestError::Io(e) => TransportError::Network(e.to_string()),
        RequestError::RetryAfter(after) => {
            TransportError::Network(format!("rate limited, retry after {after:?}"))
        }
        other => TransportError::Api(other.to_string()),
    }
}

/// [`Transport`] backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wrap a bot client
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Share the adapter's bot client
    #[must_use]
    pub fn from_adapter(adapter: &TelegramAdapter) -> Self {
        Self::new(adapter.bot.clone())
    }
}

fn parse_mode(mode: CoreParseMode) -> Option<ParseMode> {
    match mode {
        CoreParseMode::Plain => None,
        CoreParseMode::Html => Some(ParseMode::Html),
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        chat: CorrespondentId,
        message: &OutgoingMessage,
    ) -> Result<CoreMessageId, TransportError> {
        let mut request = self.bot.send_message(ChatId(chat), &message.text);
        if let Some(mode) = parse_mode(message.parse_mode) {
            request = request.parse_mode(mode);
        }
        if let Some(keyboard) = TelegramAdapter::build_keyboard(&message.keyboard) {
            request = request.reply_markup(keyboard);
        }

        let sent = request.await.map_err(map_request_error)?;
        debug!(chat_id = chat, message_id = sent.id.0, "Sent message");
        Ok(sent.id.0)
    }

    async fn edit(
        &self,
        chat: CorrespondentId,
        message_id: CoreMessageId,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        let mut request =
            self.bot
                .edit_message_text(ChatId(chat), MessageId(message_id), &message.text);
        if let Some(mode) = parse_mode(message.parse_mode) {
            request = request.parse_mode(mode);
        }
        if let Some(keyboard) = TelegramAdapter::build_keyboard(&message.keyboard) {
            request = request.reply_markup(keyboard);
        }

        request.await.map_err(map_request_error)?;
        Ok(())
    }

    async fn delete_messages(
        &self,
        chat: CorrespondentId,
        message_ids: &[CoreMessageId],
    ) -> Result<(), TransportError> {
        match message_ids {
            [] => Ok(()),
            [single] => {
                self.bot
                    .delete_message(ChatId(chat), MessageId(*single))
                    .await
                    .map_err(map_request_error)?;
                Ok(())
            }
            many => {
                let ids: Vec<MessageId> = many.iter().map(|id| MessageId(*id)).collect();
                self.bot
                    .delete_messages(ChatId(chat), ids)
                    .await
                    .map_err(map_request_error)?;
                Ok(())
            }
        }
    }

    async fn answer_callback(
        &self,
        query_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(query_id.to_string()));
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await.map_err(map_request_error)?;
        Ok(())
    }
}
