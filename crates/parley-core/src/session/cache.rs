//! Sharded LRU cache with time-to-live expiry

use crate::record::{CorrespondentId, Record};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as RecordLock;
use tracing::debug;

/// Shared, individually locked record
pub(crate) type SharedRecord = Arc<RecordLock<Record>>;

struct CacheEntry {
    record: SharedRecord,
    expires_at: Instant,
}

/// Index from correspondent id to record. Each shard has its own lock so
/// lookups for ids in different shards never contend.
pub(crate) struct ShardedCache {
    shards: Vec<Mutex<LruCache<CorrespondentId, CacheEntry>>>,
    ttl: Duration,
}

impl ShardedCache {
    pub(crate) fn new(capacity: usize, shards: usize, ttl: Duration) -> Self {
        let shard_count = shards.clamp(1, capacity.max(1));
        let per_shard = capacity.max(1).div_ceil(shard_count);
        let per_shard = NonZeroUsize::new(per_shard).unwrap_or(NonZeroUsize::MIN);
        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
            ttl,
        }
    }

    fn shard(&self, id: CorrespondentId) -> MutexGuard<'_, LruCache<CorrespondentId, CacheEntry>> {
        let index = (id.unsigned_abs() % self.shards.len() as u64) as usize;
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch a live entry and mark it most recently used. Expired entries are dropped.
    pub(crate) fn get(&self, id: CorrespondentId) -> Option<SharedRecord> {
        let mut shard = self.shard(id);
        let expired = match shard.get(&id) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.record.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            shard.pop(&id);
            debug!(correspondent = id, "Cache entry expired");
        }
        None
    }

    /// Fetch without touching recency
    pub(crate) fn peek(&self, id: CorrespondentId) -> Option<SharedRecord> {
        let shard = self.shard(id);
        shard
            .peek(&id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.record.clone())
    }

    /// Index a record, displacing the least recently used entry if full.
    /// The time-to-live restarts from now.
    pub(crate) fn insert(&self, id: CorrespondentId, shared: SharedRecord) -> SharedRecord {
        let entry = CacheEntry {
            record: shared.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        if let Some((evicted, _)) = self.shard(id).push(id, entry) {
            if evicted != id {
                debug!(correspondent = evicted, "Cache entry displaced by capacity");
            }
        }
        shared
    }

    pub(crate) fn remove(&self, id: CorrespondentId) -> Option<SharedRecord> {
        self.shard(id).pop(&id).map(|entry| entry.record)
    }

    /// Drop every expired entry, returning how many were removed
    pub(crate) fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let expired: Vec<CorrespondentId> = shard
                .iter()
                .filter(|(_, entry)| entry.expires_at <= now)
                .map(|(id, _)| *id)
                .collect();
            for id in expired {
                shard.pop(&id);
                removed += 1;
            }
        }
        removed
    }

    /// Live entries across all shards
    pub(crate) fn entries(&self) -> Vec<(CorrespondentId, SharedRecord)> {
        let now = Instant::now();
        let mut entries = Vec::new();
        for shard in &self.shards {
            let shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            entries.extend(
                shard
                    .iter()
                    .filter(|(_, entry)| entry.expires_at > now)
                    .map(|(id, entry)| (*id, entry.record.clone())),
            );
        }
        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}
