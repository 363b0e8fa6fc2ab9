//! Transport contract
//!
//! The chat-platform client the engine talks to. Implementations live in
//! `parley-channels`; the core only depends on this trait.

use crate::record::{CorrespondentId, MessageId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distinguished transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The edit would not change the message; callers treat this as success
    #[error("message is not modified")]
    NotModified,

    /// The target message or chat does not exist
    #[error("message not found")]
    NotFound,

    /// The correspondent blocked the bot or deactivated their account
    #[error("bot was blocked by the correspondent")]
    Blocked,

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Any other platform API error
    #[error("api error: {0}")]
    Api(String),
}

/// Text formatting mode for outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Plain text
    #[default]
    Plain,
    /// Telegram-flavoured HTML
    Html,
}

/// Inline keyboard button carrying a callback payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Label
    pub text: String,
    /// Callback payload (see [`crate::dispatch::CallbackData`])
    pub callback_data: String,
}

impl Button {
    /// Create a callback button
    pub fn callback(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Message text
    pub text: String,
    /// Formatting mode
    #[serde(default)]
    pub parse_mode: ParseMode,
    /// Inline keyboard rows
    #[serde(default)]
    pub keyboard: Vec<Vec<Button>>,
}

impl OutgoingMessage {
    /// Plain text message
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// HTML formatted message
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: ParseMode::Html,
            keyboard: Vec::new(),
        }
    }

    /// Append a keyboard row
    #[must_use]
    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        self.keyboard.push(row);
        self
    }
}

/// Chat-platform client.
///
/// Implementations must be safe to call concurrently from many dispatch workers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message, returning its platform id
    async fn send(
        &self,
        chat: CorrespondentId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, TransportError>;

    /// Replace the content of an existing message
    async fn edit(
        &self,
        chat: CorrespondentId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError>;

    /// Delete one or more messages
    async fn delete_messages(
        &self,
        chat: CorrespondentId,
        message_ids: &[MessageId],
    ) -> Result<(), TransportError>;

    /// Acknowledge an interactive callback, optionally with a toast text
    async fn answer_callback(&self, query_id: &str, text: Option<&str>)
        -> Result<(), TransportError>;
}
