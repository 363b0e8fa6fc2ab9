//! Durable record storage
//!
//! - `SqliteRecordStore`: default backend, one row per correspondent
//! - `MemoryRecordStore`: development and testing
//!
//! Implementations must tolerate concurrent calls from many dispatch
//! workers and from the write-behind lanes.

mod sqlite;

pub use sqlite::SqliteRecordStore;

use crate::error::{Error, Result};
use crate::record::{CorrespondentId, Record, RecordDiff};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Record storage contract
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a new record. Fails if the id is 0 or already stored.
    async fn insert(&self, record: &Record) -> Result<()>;

    /// Load a record
    async fn find(&self, id: CorrespondentId) -> Result<Option<Record>>;

    /// Apply a sparse diff to a stored record
    async fn apply_diff(&self, id: CorrespondentId, diff: &RecordDiff) -> Result<()>;
}

/// In-memory record store (for development/testing)
///
/// Data is lost on restart.
#[derive(Default, Clone)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<HashMap<CorrespondentId, Record>>>,
}

impl MemoryRecordStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &Record) -> Result<()> {
        let id = record.id();
        if id == 0 {
            return Err(Error::Validation("record id must not be 0".to_string()));
        }
        let mut records = self.records.write().await;
        if records.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }
        records.insert(id, record.clone());
        debug!(correspondent = id, "Record inserted into memory store");
        Ok(())
    }

    async fn find(&self, id: CorrespondentId) -> Result<Option<Record>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn apply_diff(&self, id: CorrespondentId, diff: &RecordDiff) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("record {id}")))?;
        diff.apply_to(record);
        Ok(())
    }
}
