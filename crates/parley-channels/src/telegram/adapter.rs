//! Telegram adapter core

use super::config::TelegramConfig;
use parley_core::{Button, Event, Identity};
use teloxide::{
    prelude::*,
    types::{
        CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message as TelegramMessage,
        User,
    },
};
use tracing::debug;

/// Telegram bot adapter
pub struct TelegramAdapter {
    pub(crate) bot: Bot,
    pub(crate) config: TelegramConfig,
}

impl TelegramAdapter {
    /// Create a new Telegram adapter
    #[must_use]
    pub fn new(config: TelegramConfig) -> Self {
        let bot = Bot::new(&config.bot_token);
        Self { bot, config }
    }

    /// Create from environment
    pub fn from_env() -> crate::Result<Self> {
        let config = TelegramConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the underlying bot
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Check if a user is allowed
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.config.allowed_users.is_empty() || self.config.allowed_users.contains(&user_id)
    }

    /// Identity snapshot of a Telegram user
    pub fn identity_from_user(user: &User) -> Identity {
        Identity {
            id: user.id.0 as i64,
            is_bot: user.is_bot,
            language_code: user.language_code.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            is_premium: user.is_premium,
        }
    }

    /// Convert a private-chat message into an engine event
    pub fn event_from_message(&self, msg: &TelegramMessage) -> Option<Event> {
        if !msg.chat.is_private() {
            debug!(chat_id = %msg.chat.id, "Ignoring non-private chat");
            return None;
        }
        let sender = msg.from.as_ref().map(Self::identity_from_user);
        if let Some(sender) = &sender {
            if !self.is_user_allowed(sender.id) {
                debug!(user_id = sender.id, "User not in allowlist");
                return None;
            }
        }
        Some(Event::message(
            msg.chat.id.0,
            sender,
            msg.id.0,
            msg.text().or_else(|| msg.caption()),
        ))
    }

    /// Convert an inline button press into an engine event
    pub fn event_from_callback(&self, query: &CallbackQuery) -> Option<Event> {
        let Some(data) = &query.data else {
            debug!("Ignoring callback query without data");
            return None;
        };
        let sender = Self::identity_from_user(&query.from);
        if !self.is_user_allowed(sender.id) {
            debug!(user_id = sender.id, "User not in allowlist");
            return None;
        }
        let (chat_id, message_id) = match &query.message {
            Some(message) if !message.chat().is_private() => {
                debug!(chat_id = %message.chat().id, "Ignoring non-private callback");
                return None;
            }
            Some(message) => (message.chat().id.0, message.id().0),
            None => (sender.id, 0),
        };
        Some(Event::callback(
            chat_id,
            Some(sender),
            query.id.to_string(),
            message_id,
            data.clone(),
        ))
    }

    /// Empty answer for a button press that will not be dispatched
    pub(crate) fn acknowledgement(
        &self,
        query: &CallbackQuery,
    ) -> <Bot as Requester>::AnswerCallbackQuery {
        self.bot.answer_callback_query(query.id.clone())
    }

    /// Answer a dropped button press so the client stops its loading indicator
    pub async fn acknowledge_callback(&self, query: &CallbackQuery) {
        if let Err(e) = self.acknowledgement(query).await {
            debug!(query_id = %query.id, error = %e, "Dropped callback acknowledgement failed");
        }
    }

    /// Build inline keyboard from button rows
    pub fn build_keyboard(rows: &[Vec<Button>]) -> Option<InlineKeyboardMarkup> {
        let rows: Vec<Vec<InlineKeyboardButton>> = rows
            .iter()
            .filter(|row| !row.is_empty())
            .map(|row| {
                row.iter()
                    .map(|b| InlineKeyboardButton::callback(&b.text, &b.callback_data))
                    .collect()
            })
            .collect();
        if rows.is_empty() {
            return None;
        }
        Some(InlineKeyboardMarkup::new(rows))
    }
}
