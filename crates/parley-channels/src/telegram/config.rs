//! Telegram configuration types

use crate::error::{Error, Result};

/// Telegram bot configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token
    pub bot_token: String,
    /// Allowed user IDs (empty = allow all)
    pub allowed_users: Vec<i64>,
}

impl TelegramConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| Error::Configuration("TELEGRAM_BOT_TOKEN not set".to_string()))?;

        let allowed_users: Vec<i64> = std::env::var("TELEGRAM_ALLOWED_USERS")
            .ok()
            .map(|s| {
                s.split(',')
                    .filter_map(|id| id.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self::new(bot_token).with_allowed_users(allowed_users))
    }

    /// Create with a bot token
    #[must_use]
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            allowed_users: Vec::new(),
        }
    }

    /// Set allowed users
    #[must_use]
    pub fn with_allowed_users(mut self, users: Vec<i64>) -> Self {
        self.allowed_users = users;
        self
    }

    /// Fail early on a token that cannot be valid
    pub fn validate(&self) -> Result<()> {
        let token = self.bot_token.trim();
        if token.is_empty() {
            return Err(Error::Configuration("telegram bot token is empty".to_string()));
        }
        match token.split_once(':') {
            Some((id, secret)) if id.parse::<u64>().is_ok() && !secret.is_empty() => Ok(()),
            _ => Err(Error::Configuration(
                "telegram bot token must look like <bot id>:<secret>".to_string(),
            )),
        }
    }
}
