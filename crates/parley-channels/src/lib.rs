//! Parley Channels - Chat-Platform Adapters
//!
//! This crate connects the Parley dispatch pipeline to messaging platforms:
//! - Telegram (via teloxide), long polling, private chats

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod telegram;

pub use error::{Error, Result};

// Re-export Telegram adapter
pub use telegram::{TelegramAdapter, TelegramConfig, TelegramTransport};
