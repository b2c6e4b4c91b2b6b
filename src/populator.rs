//! Background cache population.
//!
//! Misses hand their warm batch to a bounded queue drained by a fixed pool of
//! worker tasks, so the request that triggered population never waits on cache
//! writes. Every job ends in a [`PopulateOutcome`] that is counted in metrics
//! and broadcast to subscribers; a failing or panicking job never takes a
//! worker down.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tracing::{debug, error, warn};

use crate::cache::RangeCache;
use crate::error::{CacheError, PopulateError};
use crate::metrics::Metrics;
use crate::model::ScoredMember;

/// A batch of members to write into one cache collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateJob {
    pub key: String,
    pub entries: Vec<ScoredMember>,
    /// Whether `entries` is the target's whole fans list.
    pub complete: bool,
}

/// How a population job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulateOutcome {
    Completed { key: String, written: usize },
    Failed { key: String, error: String },
    Panicked { key: String },
    /// Rejected at dispatch because the queue was full or closed.
    Dropped { key: String },
}

impl PopulateOutcome {
    pub fn key(&self) -> &str {
        match self {
            PopulateOutcome::Completed { key, .. }
            | PopulateOutcome::Failed { key, .. }
            | PopulateOutcome::Panicked { key }
            | PopulateOutcome::Dropped { key } => key,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PopulateOutcome::Completed { .. } => "completed",
            PopulateOutcome::Failed { .. } => "failed",
            PopulateOutcome::Panicked { .. } => "panicked",
            PopulateOutcome::Dropped { .. } => "dropped",
        }
    }
}

/// Worker pool sizing and cache write settings.
#[derive(Debug, Clone)]
pub struct PopulatorSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Expiry applied to a collection after each job.
    pub ttl: Duration,
    /// Budget for each individual cache call.
    pub call_timeout: Duration,
}

struct Shared {
    cache: Arc<dyn RangeCache>,
    ttl: Duration,
    call_timeout: Duration,
    metrics: Metrics,
    outcomes: broadcast::Sender<PopulateOutcome>,
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    async fn cache_call<T>(
        &self,
        key: &str,
        fut: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, PopulateError> {
        let result = match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.call_timeout)),
        };
        result.map_err(|source| PopulateError::Cache {
            key: key.to_string(),
            source,
        })
    }

    async fn populate(&self, job: &PopulateJob) -> Result<usize, PopulateError> {
        let key = job.key.as_str();
        for entry in &job.entries {
            self.cache_call(key, self.cache.upsert(key, entry.score, entry.member))
                .await?;
        }
        if job.complete {
            self.cache_call(key, self.cache.mark_complete(key, self.ttl)).await?;
        } else {
            self.cache_call(key, self.cache.refresh_ttl(key, self.ttl)).await?;
        }
        Ok(job.entries.len())
    }

    fn finish(&self, outcome: PopulateOutcome) {
        self.metrics
            .populate_jobs
            .with_label_values(&[outcome.label()])
            .inc();
        // No subscribers is fine.
        let _ = self.outcomes.send(outcome);
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Bounded worker pool that writes warm batches into the range cache.
pub struct AsyncPopulator {
    tx: mpsc::Sender<PopulateJob>,
    shared: Arc<Shared>,
}

impl AsyncPopulator {
    /// Spawn the workers on the current tokio runtime.
    pub fn start(cache: Arc<dyn RangeCache>, settings: PopulatorSettings, metrics: Metrics) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (outcomes, _) = broadcast::channel(256);
        let shared = Arc::new(Shared {
            cache,
            ttl: settings.ttl,
            call_timeout: settings.call_timeout,
            metrics,
            outcomes,
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..settings.workers.max(1) {
            tokio::spawn(run_worker(worker_id, rx.clone(), shared.clone()));
        }

        Self { tx, shared }
    }

    /// Queue a job without waiting. A full or closed queue drops the job.
    pub fn dispatch(&self, job: PopulateJob) {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => {
                warn!(key = %job.key, entries = job.entries.len(), "Population queue unavailable, dropping job");
                self.shared.finish(PopulateOutcome::Dropped { key: job.key });
            }
        }
    }

    /// Observe the outcome of every job finished after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PopulateOutcome> {
        self.shared.outcomes.subscribe()
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Resolve once no job is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<PopulateJob>>>,
    shared: Arc<Shared>,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            debug!(worker_id, "Population queue closed, worker exiting");
            return;
        };

        let key = job.key.clone();
        let outcome = match AssertUnwindSafe(shared.populate(&job)).catch_unwind().await {
            Ok(Ok(written)) => {
                debug!(worker_id, key = %key, written, complete = job.complete, "Populated fans cache");
                PopulateOutcome::Completed { key, written }
            }
            Ok(Err(e)) => {
                warn!(worker_id, key = %key, error = %e, "Fans cache population failed");
                PopulateOutcome::Failed {
                    key,
                    error: e.to_string(),
                }
            }
            Err(_) => {
                error!(worker_id, key = %key, "Fans cache population panicked");
                PopulateOutcome::Panicked { key }
            }
        };
        shared.finish(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryRangeCache;

    fn settings(queue_capacity: usize) -> PopulatorSettings {
        PopulatorSettings {
            workers: 2,
            queue_capacity,
            ttl: Duration::from_secs(60),
            call_timeout: Duration::from_secs(1),
        }
    }

    fn job(key: &str, complete: bool) -> PopulateJob {
        PopulateJob {
            key: key.to_string(),
            entries: vec![
                ScoredMember { member: 1, score: 30 },
                ScoredMember { member: 2, score: 20 },
            ],
            complete,
        }
    }

    #[tokio::test]
    async fn test_job_writes_members_flag_and_ttl() {
        let cache = Arc::new(MemoryRangeCache::new());
        let metrics = Metrics::new().unwrap();
        let populator = AsyncPopulator::start(cache.clone(), settings(8), metrics.clone());
        let mut outcomes = populator.subscribe();

        populator.dispatch(job("k", true));
        populator.wait_idle().await;

        assert_eq!(cache.len("k").await, 2);
        assert!(cache.is_complete("k").await.unwrap());
        assert!(cache.ttl("k").await.is_some());
        assert_eq!(
            outcomes.recv().await.unwrap(),
            PopulateOutcome::Completed {
                key: "k".to_string(),
                written: 2
            }
        );
        assert_eq!(
            metrics.populate_jobs.with_label_values(&["completed"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_incomplete_job_leaves_flag_unset() {
        let cache = Arc::new(MemoryRangeCache::new());
        let populator = AsyncPopulator::start(cache.clone(), settings(8), Metrics::new().unwrap());

        populator.dispatch(job("k", false));
        populator.wait_idle().await;

        assert_eq!(cache.len("k").await, 2);
        assert!(!cache.is_complete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_idle_returns_when_nothing_queued() {
        let cache = Arc::new(MemoryRangeCache::new());
        let populator = AsyncPopulator::start(cache, settings(8), Metrics::new().unwrap());
        populator.wait_idle().await;
        assert_eq!(populator.pending(), 0);
    }
}
