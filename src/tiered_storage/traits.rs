//! ColdStore trait - contract consumed by the core from the durable tier
//!
//! The core only needs two operations from persistent storage: an atomic batch
//! insert and an ordered inclusive range scan. Everything else has a default.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

use crate::types::{LogEntry, Timestamp};

/// Durable, unbounded log storage.
#[async_trait]
pub trait ColdStore: Send + Sync {
    /// Durably write a batch of entries.
    ///
    /// Must be all-or-nothing per call. Writing an entry whose
    /// `(timestamp, sequence)` position is already stored must succeed
    /// without creating a second row, so that a retried eviction cannot
    /// duplicate data. Entries sharing a dedup key but not a position are
    /// all kept; reconciling them is the query merger's job.
    async fn insert(&self, entries: &[LogEntry]) -> Result<()>;

    /// Entries with `start <= timestamp <= end`, ordered by timestamp then
    /// sequence.
    async fn range_query(&self, start: Timestamp, end: Timestamp) -> Result<Vec<LogEntry>>;

    /// Number of entries stored.
    async fn count(&self) -> Result<u64>;

    /// Highest insertion sequence persisted, if any.
    async fn max_sequence(&self) -> Result<Option<u64>> {
        Ok(None)
    }

    /// Access and size figures for this tier.
    async fn get_metrics(&self) -> Result<TierMetricsSnapshot>;

    /// Backend-specific housekeeping (statistics refresh, compaction, ...).
    async fn maintenance(&self) -> Result<()> {
        Ok(())
    }

    /// Name used in logs and metrics.
    fn tier_name(&self) -> &'static str;

    /// Expected access time, used for alerting.
    fn target_access_time(&self) -> Duration;
}

/// Snapshot of tier-specific metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierMetricsSnapshot {
    /// Total number of entries in this tier
    pub record_count: u64,

    /// Number of range queries served
    pub access_count: u64,

    /// Range queries that returned at least one entry
    pub hit_count: u64,

    /// Range queries that returned nothing
    pub miss_count: u64,

    /// Average access time in microseconds
    pub avg_access_time_us: u64,

    /// P95 access time in microseconds
    pub p95_access_time_us: u64,

    /// P99 access time in microseconds
    pub p99_access_time_us: u64,

    /// Entries removed from this tier (hot cache only)
    pub eviction_count: u64,
}

impl TierMetricsSnapshot {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.access_count == 0 {
            0.0
        } else {
            (self.hit_count as f64 / self.access_count as f64) * 100.0
        }
    }

    /// Check if this tier is meeting its performance targets
    pub fn is_within_target(&self, target: Duration) -> bool {
        self.p95_access_time_us as u128 <= target.as_micros()
    }
}

/// Rolling access-time window shared by the tier implementations.
#[derive(Debug, Default)]
pub(crate) struct AccessStats {
    access_count: u64,
    hit_count: u64,
    miss_count: u64,
    // Recent access times for percentile calculation
    access_times_us: VecDeque<u64>,
}

const ACCESS_WINDOW: usize = 1000;

impl AccessStats {
    pub(crate) fn record(&mut self, duration_us: u64, hit: bool) {
        self.access_count += 1;
        if hit {
            self.hit_count += 1;
        } else {
            self.miss_count += 1;
        }

        if self.access_times_us.len() == ACCESS_WINDOW {
            self.access_times_us.pop_front();
        }
        self.access_times_us.push_back(duration_us);
    }

    pub(crate) fn snapshot(&self, record_count: u64, eviction_count: u64) -> TierMetricsSnapshot {
        let mut sorted_times: Vec<u64> = self.access_times_us.iter().copied().collect();
        sorted_times.sort_unstable();

        let avg_access_time_us = if sorted_times.is_empty() {
            0
        } else {
            sorted_times.iter().sum::<u64>() / sorted_times.len() as u64
        };

        TierMetricsSnapshot {
            record_count,
            access_count: self.access_count,
            hit_count: self.hit_count,
            miss_count: self.miss_count,
            avg_access_time_us,
            p95_access_time_us: calculate_percentile(&sorted_times, 95.0),
            p99_access_time_us: calculate_percentile(&sorted_times, 99.0),
            eviction_count,
        }
    }
}

/// Calculate percentile from sorted access times
fn calculate_percentile(sorted_times: &[u64], percentile: f64) -> u64 {
    if sorted_times.is_empty() {
        return 0;
    }
    let index = ((sorted_times.len() as f64 - 1.0) * percentile / 100.0) as usize;
    sorted_times[index]
}
