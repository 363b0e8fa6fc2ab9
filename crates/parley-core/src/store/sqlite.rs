//! SQLite record storage backend
//!
//! Each field group is stored as a JSON column so a diff updates only the
//! columns it carries.
//!
//! ```no_run
//! use parley_core::store::SqliteRecordStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Default location: ~/.parley/records.db
//! let store = SqliteRecordStore::new_default().await?;
//!
//! // Or a custom path
//! let store = SqliteRecordStore::new("/var/lib/parley/records.db").await?;
//! # Ok(())
//! # }
//! ```

use super::RecordStore;
use crate::error::{Error, Result};
use crate::record::{CorrespondentId, Identity, MessageRoles, Record, RecordDiff, StateTracker, Stats};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite record store
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (or create) a store at `path`
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Configuration(format!("Invalid SQLite path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to SQLite: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "SQLite record store initialized");
        Ok(store)
    }

    /// Open the store at the default location (~/.parley/records.db)
    pub async fn new_default() -> Result<Self> {
        Self::new(Self::default_path()?).await
    }

    /// Default database path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Configuration("Could not determine home directory".to_string()))?;
        Ok(home.join(".parley").join("records.db"))
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY,
                identity TEXT NOT NULL,
                state TEXT NOT NULL,
                messages TEXT NOT NULL,
                stats TEXT NOT NULL,
                disabled INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to create records table: {}", e)))?;

        debug!("SQLite record schema initialized");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Health check failed: {}", e)))?;
        Ok(true)
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to count records: {}", e)))?;
        Ok(count)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Storage(format!("Failed to encode: {}", e)))
}

fn decode<T: DeserializeOwned>(column: &str, data: &str) -> Result<T> {
    serde_json::from_str(data)
        .map_err(|e| Error::Storage(format!("Failed to decode {}: {}", column, e)))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &Record) -> Result<()> {
        let id = record.id();
        if id == 0 {
            return Err(Error::Validation("record id must not be 0".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO records (id, identity, state, messages, stats, disabled, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(encode(&record.identity)?)
        .bind(encode(&record.state)?)
        .bind(encode(&record.messages)?)
        .bind(encode(&record.stats)?)
        .bind(record.disabled)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::AlreadyExists(id),
            other => Error::Storage(format!("Failed to insert record: {}", other)),
        })?;

        debug!(correspondent = id, "Record inserted into SQLite");
        Ok(())
    }

    async fn find(&self, id: CorrespondentId) -> Result<Option<Record>> {
        let row: Option<(String, String, String, String, bool)> = sqlx::query_as(
            "SELECT identity, state, messages, stats, disabled FROM records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to load record: {}", e)))?;

        let Some((identity, state, messages, stats, disabled)) = row else {
            return Ok(None);
        };

        let mut identity: Identity = decode("identity", &identity)?;
        identity.id = id;
        let state: StateTracker = decode("state", &state)?;
        let messages: MessageRoles = decode("messages", &messages)?;
        let stats: Stats = decode("stats", &stats)?;

        Ok(Some(Record {
            identity,
            state,
            messages,
            stats,
            disabled,
        }))
    }

    async fn apply_diff(&self, id: CorrespondentId, diff: &RecordDiff) -> Result<()> {
        if diff.is_empty() {
            return Ok(());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE records SET updated_at = ");
        query.push_bind(Utc::now().to_rfc3339());
        if let Some(identity) = &diff.identity {
            let mut identity = identity.clone();
            identity.id = id;
            query.push(", identity = ").push_bind(encode(&identity)?);
        }
        if let Some(state) = &diff.state {
            query.push(", state = ").push_bind(encode(state)?);
        }
        if let Some(messages) = &diff.messages {
            query.push(", messages = ").push_bind(encode(messages)?);
        }
        if let Some(stats) = &diff.stats {
            query.push(", stats = ").push_bind(encode(stats)?);
        }
        if let Some(disabled) = diff.disabled {
            query.push(", disabled = ").push_bind(disabled);
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to apply diff: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("record {id}")));
        }
        Ok(())
    }
}
