//! Server configuration types
//!
//! Contains the configuration structures for the Parley bot and their
//! conversion into the engine's runtime settings.

use anyhow::{bail, Context, Result};
use parley_channels::TelegramConfig;
use parley_core::{CacheConfig, DispatchConfig, RetryConfig, SessionConfig, WriteBehindConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub write_behind: WriteBehindSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub language: LanguageSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub admin: AdminSection,
}

impl AppConfig {
    /// Session cache and write-behind settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            cache: CacheConfig {
                capacity: self.cache.capacity,
                ttl: Duration::from_secs(self.cache.ttl_secs),
                shards: self.cache.shards,
            },
            write_behind: WriteBehindConfig {
                lanes: self.write_behind.lanes,
                queue_capacity: self.write_behind.queue_capacity,
                retry: RetryConfig::new()
                    .with_max_attempts(self.write_behind.max_attempts)
                    .with_initial_delay(Duration::from_millis(self.write_behind.initial_delay_ms)),
                log_writes: self.logging.log_store_writes,
            },
        }
    }

    /// Pipeline settings with every optional flag resolved
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            obtain_timeout: Duration::from_millis(self.dispatch.obtain_timeout_ms),
            delete_inbound: resolve_flag(self.dispatch.delete_inbound, false),
            log_updates: self.logging.log_updates,
        }
    }

    /// Telegram settings, falling back to `TELEGRAM_*` environment variables
    /// when no token is configured
    pub fn telegram_config(&self) -> Result<TelegramConfig> {
        let config = match self.telegram.bot_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => TelegramConfig::new(token)
                .with_allowed_users(self.telegram.allowed_users.clone()),
            _ => TelegramConfig::from_env().context("No Telegram bot token configured")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            bail!("cache.capacity must be greater than 0");
        }
        if self.cache.shards == 0 {
            bail!("cache.shards must be greater than 0");
        }
        if self.cache.ttl_secs == 0 {
            bail!("cache.ttl_secs must be greater than 0");
        }
        if self.cache.sweep_interval_secs == 0 {
            bail!("cache.sweep_interval_secs must be greater than 0");
        }
        if self.write_behind.lanes == 0 || self.write_behind.queue_capacity == 0 {
            bail!("write_behind.lanes and write_behind.queue_capacity must be greater than 0");
        }
        if self.write_behind.max_attempts == 0 {
            bail!("write_behind.max_attempts must be at least 1");
        }
        if self.dispatch.obtain_timeout_ms == 0 {
            bail!("dispatch.obtain_timeout_ms must be greater than 0");
        }
        Ok(())
    }

    /// Configuration as TOML with secrets masked
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if let Some(token) = redacted.telegram.bot_token.as_mut() {
            if !token.is_empty() {
                *token = "***".to_string();
            }
        }
        toml::to_string_pretty(&redacted).context("Failed to serialize config")
    }
}

/// Resolve an optional flag to a concrete value, once, at startup
pub fn resolve_flag(value: Option<bool>, default: bool) -> bool {
    value.unwrap_or(default)
}

/// Telegram configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramSection {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Allowed user IDs (empty = allow all)
    #[serde(default)]
    pub allowed_users: Vec<i64>,
}

/// Session cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_shards")]
    pub shards: usize,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl CacheSection {
    /// How often expired sessions are purged
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_secs: default_ttl_secs(),
            shards: default_shards(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_capacity() -> usize {
    10_000
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_shards() -> usize {
    16
}
fn default_sweep_interval() -> u64 {
    60
}

/// Record store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Record store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite file (empty = ~/.parley/records.db)
    #[serde(default)]
    pub path: Option<String>,
}

impl StoreSection {
    /// Explicitly configured SQLite path, if any
    pub fn sqlite_path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

/// Write-behind queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBehindSection {
    #[serde(default = "default_lanes")]
    pub lanes: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for WriteBehindSection {
    fn default() -> Self {
        Self {
            lanes: default_lanes(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

fn default_lanes() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay_ms() -> u64 {
    100
}

/// Dispatch pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_obtain_timeout_ms")]
    pub obtain_timeout_ms: u64,
    /// Delete the correspondent's own messages (unset = keep them)
    #[serde(default)]
    pub delete_inbound: Option<bool>,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            obtain_timeout_ms: default_obtain_timeout_ms(),
            delete_inbound: None,
        }
    }
}

fn default_obtain_timeout_ms() -> u64 {
    5000
}

/// Language configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageSection {
    #[serde(default = "default_language")]
    pub default: String,
}

impl Default for LanguageSection {
    fn default() -> Self {
        Self {
            default: default_language(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
    /// Audit-log every update
    #[serde(default = "default_true")]
    pub log_updates: bool,
    /// Log every applied store diff at debug level
    #[serde(default)]
    pub log_store_writes: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            json: false,
            log_updates: true,
            log_store_writes: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Administrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminSection {
    /// Correspondents allowed to run admin commands
    #[serde(default)]
    pub user_ids: Vec<i64>,
}
