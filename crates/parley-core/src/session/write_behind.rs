//! Write-behind persistence queue
//!
//! Diffs are routed to one of N lanes by correspondent id. Each lane is a
//! bounded FIFO drained by a single worker, so diffs for the same id are
//! applied in submission order while different ids proceed in parallel.
//!
//! A diff that still fails after the retry budget is logged and dropped.
//! The cached record stays authoritative until it is evicted; a drop that
//! races an eviction loses those field groups in the store.

use crate::error::Error;
use crate::record::{CorrespondentId, RecordDiff};
use crate::store::RecordStore;
use crate::utils::{retry_with_backoff, RetryConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Write-behind tuning
#[derive(Debug, Clone)]
pub struct WriteBehindConfig {
    /// Number of independent lanes (workers)
    pub lanes: usize,
    /// Queue capacity per lane; submitters wait when a lane is full
    pub queue_capacity: usize,
    /// Backoff policy for failed applies
    pub retry: RetryConfig,
    /// Log every applied diff at debug level
    pub log_writes: bool,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            lanes: 4,
            queue_capacity: 1024,
            retry: RetryConfig::default(),
            log_writes: false,
        }
    }
}

enum Job {
    Apply {
        id: CorrespondentId,
        diff: RecordDiff,
    },
    Flush(oneshot::Sender<()>),
    Stop,
}

#[derive(Default)]
struct Counters {
    applied: AtomicU64,
    dropped: AtomicU64,
}

/// Ordered, asynchronous diff applier
pub struct WriteBehind {
    lanes: Vec<mpsc::Sender<Job>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl WriteBehind {
    /// Spawn the lane workers. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn RecordStore>, config: WriteBehindConfig) -> Arc<Self> {
        let lane_count = config.lanes.max(1);
        let counters = Arc::new(Counters::default());
        let mut lanes = Vec::with_capacity(lane_count);
        let mut workers = Vec::with_capacity(lane_count);

        for lane in 0..lane_count {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            lanes.push(tx);
            workers.push(tokio::spawn(run_lane(
                lane,
                rx,
                store.clone(),
                config.clone(),
                counters.clone(),
            )));
        }

        info!(lanes = lane_count, "Write-behind queue started");
        Arc::new(Self {
            lanes,
            workers: Mutex::new(workers),
            counters,
        })
    }

    fn lane(&self, id: CorrespondentId) -> &mpsc::Sender<Job> {
        &self.lanes[(id.unsigned_abs() % self.lanes.len() as u64) as usize]
    }

    /// Queue a diff. Waits only while the lane is full.
    pub async fn submit(&self, id: CorrespondentId, diff: RecordDiff) {
        if diff.is_empty() {
            return;
        }
        if self.lane(id).send(Job::Apply { id, diff }).await.is_err() {
            warn!(correspondent = id, "Write-behind queue closed, diff dropped");
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Wait until every diff submitted for `id` before this call has been handled
    pub async fn flush(&self, id: CorrespondentId) {
        let (tx, rx) = oneshot::channel();
        if self.lane(id).send(Job::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Wait until all lanes are drained
    pub async fn flush_all(&self) {
        for lane in &self.lanes {
            let (tx, rx) = oneshot::channel();
            if lane.send(Job::Flush(tx)).await.is_ok() {
                let _ = rx.await;
            }
        }
    }

    /// Diffs successfully applied so far
    pub fn applied(&self) -> u64 {
        self.counters.applied.load(Ordering::Relaxed)
    }

    /// Diffs dropped after retries (or after shutdown)
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Drain every lane and stop the workers
    pub async fn shutdown(&self, timeout: Duration) {
        for lane in &self.lanes {
            let _ = lane.send(Job::Stop).await;
        }
        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if tokio::time::timeout(timeout, worker).await.is_err() {
                warn!("Write-behind lane did not stop within timeout");
            }
        }
        info!(
            applied = self.applied(),
            dropped = self.dropped(),
            "Write-behind queue stopped"
        );
    }
}

async fn run_lane(
    lane: usize,
    mut rx: mpsc::Receiver<Job>,
    store: Arc<dyn RecordStore>,
    config: WriteBehindConfig,
    counters: Arc<Counters>,
) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Apply { id, diff } => {
                let result =
                    retry_with_backoff(&config.retry, || store.apply_diff(id, &diff), Error::is_retryable)
                        .await;
                match result {
                    Ok(()) => {
                        counters.applied.fetch_add(1, Ordering::Relaxed);
                        if config.log_writes {
                            debug!(lane, correspondent = id, groups = ?diff.groups(), "Diff applied");
                        }
                    }
                    Err(e) => {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        let err = Error::StorageWrite {
                            id,
                            attempts: e.attempts,
                            message: e.last_error.to_string(),
                        };
                        error!(lane, correspondent = id, groups = ?diff.groups(), error = %err, "Dropping write-behind diff");
                    }
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
            Job::Stop => break,
        }
    }
    debug!(lane, "Write-behind lane finished");
}
