//! Session Cache and Manager
//!
//! The manager owns every entry point that hands out a mutable record:
//! - `obtain`: cache → store → create, single-flighted per id
//! - `lookup` / `all`: cache-only, non-creating
//! - `disable`: mark unreachable and evict
//!
//! The cache is bounded (LRU per shard) with time-to-live expiry. Eviction
//! only drops the cache entry. A record that is still held by a session is
//! re-indexed on the next `obtain`; otherwise the store copy is reloaded.
//! There is never more than one live instance per id.
//! Mutations are persisted through the [`WriteBehind`] queue.

mod cache;
mod handle;
mod write_behind;

pub use handle::{Session, SessionRef};
pub use write_behind::{WriteBehind, WriteBehindConfig};

use crate::error::{Error, Result};
use crate::record::{CorrespondentId, Identity, Record, RecordDiff};
use crate::store::RecordStore;
use cache::{ShardedCache, SharedRecord};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cache bounds
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum cached records (split across shards)
    pub capacity: usize,
    /// Time an entry stays cached after it was loaded
    pub ttl: Duration,
    /// Independently locked index shards
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(60 * 60),
            shards: 16,
        }
    }
}

/// Session manager configuration
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Cache bounds
    pub cache: CacheConfig,
    /// Write-behind tuning
    pub write_behind: WriteBehindConfig,
}

/// Bounded, TTL-evicting record cache with write-behind persistence
pub struct SessionManager {
    cache: ShardedCache,
    store: Arc<dyn RecordStore>,
    writer: Arc<WriteBehind>,
    loading: DashMap<CorrespondentId, Arc<Mutex<()>>>,
    live: DashMap<CorrespondentId, Weak<Mutex<Record>>>,
}

/// Per-id load turn. The entry is removed by the last holder, including
/// one whose load was cancelled.
struct LoadGate<'a> {
    loading: &'a DashMap<CorrespondentId, Arc<Mutex<()>>>,
    id: CorrespondentId,
    gate: Arc<Mutex<()>>,
}

impl<'a> LoadGate<'a> {
    fn enter(loading: &'a DashMap<CorrespondentId, Arc<Mutex<()>>>, id: CorrespondentId) -> Self {
        let gate = loading
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self { loading, id, gate }
    }
}

impl Drop for LoadGate<'_> {
    fn drop(&mut self) {
        // One reference in the map plus ours: nobody else is waiting.
        self.loading.remove_if(&self.id, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) <= 2
        });
    }
}

impl SessionManager {
    /// Create a manager and start its write-behind workers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(store: Arc<dyn RecordStore>, config: SessionConfig) -> Arc<Self> {
        let writer = WriteBehind::spawn(store.clone(), config.write_behind);
        info!(
            capacity = config.cache.capacity,
            ttl_secs = config.cache.ttl.as_secs(),
            shards = config.cache.shards,
            "Session manager initialized"
        );
        Arc::new(Self {
            cache: ShardedCache::new(config.cache.capacity, config.cache.shards, config.cache.ttl),
            store,
            writer,
            loading: DashMap::new(),
            live: DashMap::new(),
        })
    }

    /// Lock the session for `identity`, loading or creating its record.
    ///
    /// Display fields are overwritten with the snapshot and `last_seen_at`
    /// is bumped. A disabled record is re-enabled.
    pub async fn obtain(&self, identity: &Identity) -> Result<Session> {
        let handle = self.resolve(identity).await?;
        Ok(self.enter(handle, identity).await)
    }

    /// Handle for `identity`, loading or creating its record. Does not lock it.
    pub async fn resolve(&self, identity: &Identity) -> Result<SessionRef> {
        let id = identity.id;
        if id == 0 {
            return Err(Error::Validation("correspondent id must not be 0".to_string()));
        }

        let record = match self.cache.get(id) {
            Some(record) => record,
            None => self.load(identity).await?,
        };
        Ok(SessionRef::new(id, record, self.writer.clone()))
    }

    /// Lock a resolved handle and refresh its identity snapshot
    pub async fn enter(&self, handle: SessionRef, identity: &Identity) -> Session {
        let mut session = handle.lock().await;
        session.observe(identity).await;
        session
    }

    async fn load(&self, identity: &Identity) -> Result<SharedRecord> {
        let id = identity.id;
        let gate = LoadGate::enter(&self.loading, id);
        let _turn = gate.gate.lock().await;

        // Another worker may have finished loading while we waited.
        if let Some(record) = self.cache.get(id) {
            return Ok(record);
        }

        // Displaced while a session still holds it: the held copy is newer
        // than the store.
        if let Some(record) = self.live.get(&id).and_then(|weak| weak.upgrade()) {
            debug!(correspondent = id, "Held record re-indexed");
            return Ok(self.cache.insert(id, record));
        }

        let record = Arc::new(Mutex::new(self.load_uncached(identity).await?));
        self.live.insert(id, Arc::downgrade(&record));
        Ok(self.cache.insert(id, record))
    }

    async fn load_uncached(&self, identity: &Identity) -> Result<Record> {
        let id = identity.id;
        // Diffs queued before an eviction must land before we read the store.
        self.writer.flush(id).await;

        if let Some(record) = self.store.find(id).await? {
            debug!(correspondent = id, "Record loaded from store");
            return Ok(record);
        }

        let record = Record::new(identity.clone());
        match self.store.insert(&record).await {
            Ok(()) => {
                info!(correspondent = id, "New correspondent record created");
                Ok(record)
            }
            Err(Error::AlreadyExists(_)) => {
                warn!(correspondent = id, "Record appeared concurrently, reloading");
                self.store
                    .find(id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("record {id}")))
            }
            Err(e) => Err(e),
        }
    }

    /// Cached handle for `id`, if resident. Never touches the store.
    pub fn lookup(&self, id: CorrespondentId) -> Option<SessionRef> {
        self.cache
            .peek(id)
            .map(|record| SessionRef::new(id, record, self.writer.clone()))
    }

    /// Handles for every cached record (administrative listing only)
    pub fn all(&self) -> Vec<SessionRef> {
        self.cache
            .entries()
            .into_iter()
            .map(|(id, record)| SessionRef::new(id, record, self.writer.clone()))
            .collect()
    }

    /// Mark the correspondent unreachable and evict it. The stored copy stays.
    pub async fn disable(&self, id: CorrespondentId) -> Result<()> {
        if id == 0 {
            return Err(Error::Validation("correspondent id must not be 0".to_string()));
        }
        let held = self
            .cache
            .remove(id)
            .or_else(|| self.live.get(&id).and_then(|weak| weak.upgrade()));
        match held {
            Some(record) => {
                let mut session = SessionRef::new(id, record, self.writer.clone()).lock().await;
                session.mark_disabled().await;
            }
            None => self.writer.submit(id, RecordDiff::disabled(true)).await,
        }
        info!(correspondent = id, "Correspondent disabled");
        Ok(())
    }

    /// Drop a cache entry without touching persistence
    pub fn evict(&self, id: CorrespondentId) -> bool {
        self.cache.remove(id).is_some()
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let removed = self.cache.purge_expired();
        self.live.retain(|_, record| record.strong_count() > 0);
        removed
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write-behind queue
    pub fn writer(&self) -> &Arc<WriteBehind> {
        &self.writer
    }

    /// Periodically purge expired entries until `cancel` fires
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = manager.purge_expired();
                        if removed > 0 {
                            debug!(removed, remaining = manager.len(), "Purged expired sessions");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    /// Drain the write-behind queue and stop its workers
    pub async fn shutdown(&self, timeout: Duration) {
        self.writer.shutdown(timeout).await;
    }
}
