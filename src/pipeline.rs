//! Ingest Pipeline
//!
//! Assigns insertion sequence numbers, writes entries into the hot cache and
//! moves surplus or expired entries to the cold store. Eviction always writes
//! to the cold store first and removes from the cache only once that write is
//! confirmed, so an entry is never absent from both tiers.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ColdOperation, StoreError, StoreResult};
use crate::tiered_storage::{ColdStore, EvictionPolicy, HotCache, StoreMetrics};
use crate::types::LogEntry;
use crate::utils::{with_retry, RetryPolicy};

/// Configuration for ingest and eviction behavior
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity, retention and batch bounds of the hot cache
    pub eviction: EvictionPolicy,

    /// Retry budget for one cold store write inside an eviction cycle
    pub retry: RetryPolicy,

    /// Timer period of the background eviction loop
    pub eviction_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::default(),
            retry: RetryPolicy::default(),
            eviction_interval: Duration::from_secs(1),
        }
    }
}

/// Outcome of one eviction cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Candidates chosen by the policy
    pub selected: usize,
    /// Candidates removed from the hot cache after the cold write succeeded
    pub evicted: usize,
}

pub struct IngestPipeline {
    hot: Arc<HotCache>,
    cold: Arc<dyn ColdStore>,
    metrics: Arc<StoreMetrics>,
    config: PipelineConfig,
    next_sequence: AtomicU64,
    // Held for the whole select -> write -> remove sequence
    eviction_lock: Mutex<()>,
    wake: Notify,
}

impl IngestPipeline {
    /// Create a pipeline whose sequence numbers continue after the highest
    /// one the cold store has persisted.
    pub async fn new(
        hot: Arc<HotCache>,
        cold: Arc<dyn ColdStore>,
        metrics: Arc<StoreMetrics>,
        config: PipelineConfig,
    ) -> StoreResult<Self> {
        let resume_from = cold
            .max_sequence()
            .await
            .map_err(|e| StoreError::cold(ColdOperation::Metadata, e))?
            .unwrap_or(0);

        info!(
            "Initializing IngestPipeline (capacity: {}, batch: {}, next sequence: {})",
            config.eviction.capacity,
            config.eviction.max_batch,
            resume_from + 1
        );

        Ok(Self {
            hot,
            cold,
            metrics,
            config,
            next_sequence: AtomicU64::new(resume_from + 1),
            eviction_lock: Mutex::new(()),
            wake: Notify::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Accept one entry. Returns its insertion sequence number.
    ///
    /// The entry is visible to queries once this returns.
    #[instrument(skip(self, entry), fields(tag = %entry.tag()))]
    pub async fn ingest(&self, entry: LogEntry) -> u64 {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.hot.insert(entry.assign_sequence(sequence)).await;
        self.metrics.entries_ingested.inc();
        self.after_insert().await;
        debug!("Ingested entry with sequence {}", sequence);
        sequence
    }

    /// Accept several entries with consecutive sequence numbers in input
    /// order. Returns how many were accepted.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn ingest_batch(&self, entries: Vec<LogEntry>) -> usize {
        if entries.is_empty() {
            return 0;
        }

        let count = entries.len();
        let first = self
            .next_sequence
            .fetch_add(count as u64, Ordering::SeqCst);
        let sequenced = entries
            .into_iter()
            .zip(first..)
            .map(|(entry, sequence)| entry.assign_sequence(sequence))
            .collect();

        self.hot.insert_batch(sequenced).await;
        self.metrics.entries_ingested.inc_by(count as u64);
        self.after_insert().await;
        debug!("Ingested batch of {} entries from sequence {}", count, first);
        count
    }

    async fn after_insert(&self) {
        let resident = self.hot.len().await;
        self.metrics.hot_entries.set(resident as i64);
        if resident > self.config.eviction.capacity {
            self.wake.notify_one();
        }
    }

    /// Run one eviction cycle with the configured policy.
    ///
    /// On a cold store failure the selected entries stay in the hot cache and
    /// the error is returned; the next cycle selects them again.
    #[instrument(skip(self))]
    pub async fn run_eviction_cycle(&self) -> StoreResult<EvictionReport> {
        self.evict_with(&self.config.eviction).await
    }

    async fn evict_with(&self, policy: &EvictionPolicy) -> StoreResult<EvictionReport> {
        let _guard = self.eviction_lock.lock().await;

        let candidates = self.hot.evict_candidates(policy, Utc::now()).await;
        if candidates.is_empty() {
            return Ok(EvictionReport::default());
        }
        let selected = candidates.len();

        let cold = &self.cold;
        let written = with_retry(self.config.retry, || cold.insert(&candidates)).await;

        if let Err(e) = written {
            self.metrics.eviction_failures.inc();
            warn!(
                "Eviction of {} entries aborted, entries stay resident: {:#}",
                selected, e
            );
            return Err(StoreError::cold(ColdOperation::Insert, e));
        }

        let evicted = self.hot.remove(&candidates).await;
        self.metrics.entries_evicted.inc_by(evicted as u64);
        self.metrics.hot_entries.set(self.hot.len().await as i64);

        debug!(
            "Evicted {} of {} selected entries to {}",
            evicted,
            selected,
            self.cold.tier_name()
        );
        Ok(EvictionReport { selected, evicted })
    }

    /// Move every resident entry to the cold store. Returns how many moved.
    ///
    /// Stops at the first failed cycle; entries not yet written stay resident.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> StoreResult<usize> {
        let policy = EvictionPolicy {
            capacity: 0,
            retention: None,
            max_batch: self.config.eviction.max_batch.max(1),
        };

        let mut total = 0;
        loop {
            let report = self.evict_with(&policy).await?;
            if report.selected == 0 {
                break;
            }
            total += report.evicted;
        }

        info!("Drained {} entries to {}", total, self.cold.tier_name());
        Ok(total)
    }

    /// Start the background eviction loop.
    ///
    /// A cycle runs on every timer tick and whenever ingest pushes the cache
    /// past capacity. When a cycle fills its batch the next one runs
    /// immediately. Cancelling `shutdown` stops the loop after one final cycle.
    pub fn start_eviction_loop(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            "Starting eviction loop (interval: {}ms)",
            self.config.eviction_interval.as_millis()
        );

        tokio::spawn(async move {
            let mut ticker = time::interval(self.config.eviction_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = self.wake.notified() => {}
                }
                self.cycle_and_log().await;
            }

            self.cycle_and_log().await;
            info!("Eviction loop stopped");
        })
    }

    async fn cycle_and_log(&self) {
        match self.run_eviction_cycle().await {
            Ok(report) => {
                if report.selected > 0 && report.selected >= self.config.eviction.max_batch {
                    self.wake.notify_one();
                }
            }
            Err(e) => warn!("Eviction cycle failed: {}", e),
        }
    }
}
