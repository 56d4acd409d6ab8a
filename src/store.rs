//! Tiered Log Store
//!
//! Public entry point tying the hot cache, a cold store, the ingest pipeline
//! and the query merger together.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::StoreConfig;
use crate::error::{ColdOperation, StoreError, StoreResult};
use crate::merge::QueryMerger;
use crate::pipeline::{EvictionReport, IngestPipeline};
use crate::tiered_storage::{
    ColdStore, HotCache, SqliteColdStore, StoreMetrics, TierAlert, TierMonitor,
};
use crate::types::{normalize_timestamp, LogEntry, Timestamp};

/// Entry counts across both tiers
///
/// An entry caught mid-eviction is counted in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierStats {
    pub hot_count: u64,
    pub cold_count: u64,
}

impl TierStats {
    pub fn total_count(&self) -> u64 {
        self.hot_count + self.cold_count
    }
}

pub struct TieredLogStore {
    hot: Arc<HotCache>,
    cold: Arc<dyn ColdStore>,
    pipeline: Arc<IngestPipeline>,
    merger: QueryMerger,
    metrics: Arc<StoreMetrics>,
    monitor: TierMonitor,
    query_timeout: Option<Duration>,
    hot_capacity: usize,
}

impl TieredLogStore {
    /// Open a store backed by the SQLite database named in `config`.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;

        let cold = SqliteColdStore::new(&config.database_path, config.pool_size)
            .await
            .map_err(|e| StoreError::cold(ColdOperation::Open, e))?;

        Self::with_cold_store(Arc::new(cold), config).await
    }

    /// Build a store on top of any cold store implementation.
    pub async fn with_cold_store(
        cold: Arc<dyn ColdStore>,
        config: &StoreConfig,
    ) -> StoreResult<Self> {
        config.validate()?;

        info!(
            "Opening TieredLogStore (hot capacity: {}, cold tier: {})",
            config.hot_capacity,
            cold.tier_name()
        );

        let hot = Arc::new(HotCache::new());
        let metrics = Arc::new(StoreMetrics::new()?);
        let pipeline = IngestPipeline::new(
            hot.clone(),
            cold.clone(),
            metrics.clone(),
            config.pipeline_config(),
        )
        .await?;

        Ok(Self {
            hot,
            cold,
            pipeline: Arc::new(pipeline),
            merger: QueryMerger::new(config.inconsistency_policy),
            metrics,
            monitor: TierMonitor::new(),
            query_timeout: config.query_timeout(),
            hot_capacity: config.hot_capacity,
        })
    }

    /// Every entry with `start <= timestamp <= end` from both tiers, each
    /// exactly once, ordered by timestamp then insertion sequence.
    ///
    /// Bounds are truncated to microsecond precision like entry timestamps.
    #[instrument(skip_all, fields(%start, %end))]
    pub async fn query(&self, start: Timestamp, end: Timestamp) -> StoreResult<Vec<LogEntry>> {
        if start > end {
            self.metrics.query_failures.inc();
            return Err(StoreError::InvalidRange { start, end });
        }
        let (start, end) = (normalize_timestamp(start), normalize_timestamp(end));

        let started = Instant::now();
        let result = match self.query_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.query_tiers(start, end))
                .await
                .unwrap_or(Err(StoreError::Timeout(deadline))),
            None => self.query_tiers(start, end).await,
        };

        self.metrics.queries.inc();
        self.metrics
            .query_latency
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(entries) => debug!("Query returned {} entries", entries.len()),
            Err(e) => {
                self.metrics.query_failures.inc();
                if matches!(e, StoreError::MergeInconsistency { .. }) {
                    self.metrics.merge_inconsistencies.inc();
                }
                warn!("Query failed: {}", e);
            }
        }

        result
    }

    async fn query_tiers(&self, start: Timestamp, end: Timestamp) -> StoreResult<Vec<LogEntry>> {
        // Hot snapshot strictly before the cold read. Eviction writes cold
        // before removing hot, so an entry missing from this snapshot is
        // already visible to the cold read below.
        let cached = self.hot.range_query(start, end).await;
        let stored = self
            .cold
            .range_query(start, end)
            .await
            .map_err(|e| StoreError::cold(ColdOperation::RangeQuery, e))?;

        let outcome = self.merger.merge(cached, stored)?;
        self.metrics
            .duplicates_collapsed
            .inc_by(outcome.report.duplicates as u64);
        self.metrics
            .merge_inconsistencies
            .inc_by(outcome.report.inconsistencies as u64);

        Ok(outcome.entries)
    }

    /// Accept one entry. Returns its insertion sequence number.
    pub async fn ingest(&self, entry: LogEntry) -> u64 {
        self.pipeline.ingest(entry).await
    }

    /// Accept several entries in order. Returns how many were accepted.
    pub async fn ingest_batch(&self, entries: Vec<LogEntry>) -> usize {
        self.pipeline.ingest_batch(entries).await
    }

    /// Every entry currently resident in the hot cache, chronologically.
    pub async fn cached_entries(&self) -> Vec<LogEntry> {
        self.hot.all().await
    }

    pub async fn stats(&self) -> StoreResult<TierStats> {
        let hot_count = self.hot.len().await as u64;
        let cold_count = self
            .cold
            .count()
            .await
            .map_err(|e| StoreError::cold(ColdOperation::Metadata, e))?;

        Ok(TierStats {
            hot_count,
            cold_count,
        })
    }

    pub async fn run_eviction_cycle(&self) -> StoreResult<EvictionReport> {
        self.pipeline.run_eviction_cycle().await
    }

    /// Start background eviction. See [`IngestPipeline::start_eviction_loop`].
    pub fn start_eviction_loop(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.pipeline.clone().start_eviction_loop(shutdown)
    }

    /// Move every resident entry to the cold store.
    pub async fn drain(&self) -> StoreResult<usize> {
        self.pipeline.drain().await
    }

    /// Run cold store housekeeping and check both tiers against their targets.
    pub async fn run_maintenance(&self) -> StoreResult<()> {
        info!("Starting tier maintenance");

        self.cold
            .maintenance()
            .await
            .map_err(|e| StoreError::cold(ColdOperation::Maintenance, e))?;

        let hot_metrics = self.hot.get_metrics().await;
        let cold_metrics = self
            .cold
            .get_metrics()
            .await
            .map_err(|e| StoreError::cold(ColdOperation::Metadata, e))?;

        self.monitor
            .check_tier(
                self.hot.tier_name(),
                &hot_metrics,
                self.hot.target_access_time(),
                Some(self.hot_capacity),
            )
            .await;
        self.monitor
            .check_tier(
                self.cold.tier_name(),
                &cold_metrics,
                self.cold.target_access_time(),
                None,
            )
            .await;
        self.monitor.log_metrics_summary(&hot_metrics, &cold_metrics);

        info!("Tier maintenance completed");
        Ok(())
    }

    /// Get recent alerts from the monitor
    pub async fn get_alerts(&self) -> Vec<TierAlert> {
        self.monitor.get_alerts().await
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// Get reference to the hot tier (for advanced use cases)
    pub fn hot_tier(&self) -> &HotCache {
        &self.hot
    }

    /// Get reference to the cold tier (for advanced use cases)
    pub fn cold_tier(&self) -> &dyn ColdStore {
        self.cold.as_ref()
    }
}
