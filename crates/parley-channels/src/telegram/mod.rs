//! Telegram - teloxide adapter
//!
//! This module provides the Telegram bot adapter using the teloxide library.

mod adapter;
mod config;
mod handler;
mod transport;

#[cfg(test)]
mod tests;

// Re-export all public types
pub use adapter::TelegramAdapter;
pub use config::TelegramConfig;
pub use transport::{map_request_error, TelegramTransport};
