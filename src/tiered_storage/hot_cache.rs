//! Hot Cache (in-memory tier)
//!
//! Time-ordered buffer of recently ingested entries. Entries leave the cache
//! only through [`HotCache::remove`], which the eviction cycle calls after the
//! cold store has durably accepted them.
//! Target access time: <1ms

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::traits::{AccessStats, TierMetricsSnapshot};
use crate::types::{LogEntry, Timestamp};

/// Index key: chronological position of an entry.
type OrderKey = (Timestamp, u64);

/// Rules deciding which resident entries should move to the cold store.
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    /// Maximum number of resident entries.
    pub capacity: usize,
    /// Entries older than `now - retention` are evicted. `None` disables the
    /// age bound.
    pub retention: Option<Duration>,
    /// Upper bound on entries moved by one eviction cycle.
    pub max_batch: usize,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            retention: Some(Duration::from_secs(3600)),
            max_batch: 1_000,
        }
    }
}

/// Bounded in-memory tier holding the most recent entries.
///
/// Readers take a shared lock and copy out the matching entries, so a range
/// query always reflects one consistent snapshot of the index. Inserts and
/// removals take the exclusive lock; an entry is therefore never observed
/// half-inserted and never selected for eviction while being inserted.
pub struct HotCache {
    index: RwLock<BTreeMap<OrderKey, Arc<LogEntry>>>,
    stats: RwLock<AccessStats>,
    eviction_count: AtomicU64,
}

impl HotCache {
    pub fn new() -> Self {
        info!("Initializing HotCache");
        Self {
            index: RwLock::new(BTreeMap::new()),
            stats: RwLock::new(AccessStats::default()),
            eviction_count: AtomicU64::new(0),
        }
    }

    /// Add an entry. It is visible to range queries as soon as this returns.
    ///
    /// Entries are keyed by `(timestamp, sequence)`; inserting a second entry
    /// with the same pair replaces the first.
    pub async fn insert(&self, entry: LogEntry) {
        let key = entry.order_key();
        let mut index = self.index.write().await;
        if index.insert(key, Arc::new(entry)).is_some() {
            debug!("Hot cache replaced entry at {:?}", key);
        }
    }

    /// Add several entries under one lock acquisition.
    pub async fn insert_batch(&self, entries: Vec<LogEntry>) {
        let mut index = self.index.write().await;
        for entry in entries {
            index.insert(entry.order_key(), Arc::new(entry));
        }
    }

    /// Resident entries with `start <= timestamp <= end`, ascending.
    pub async fn range_query(&self, start: Timestamp, end: Timestamp) -> Vec<LogEntry> {
        if start > end {
            return Vec::new();
        }

        let started = Instant::now();
        let results: Vec<LogEntry> = {
            let index = self.index.read().await;
            index
                .range((start, 0)..=(end, u64::MAX))
                .map(|(_, entry)| (**entry).clone())
                .collect()
        };

        let duration_us = started.elapsed().as_micros() as u64;
        self.stats
            .write()
            .await
            .record(duration_us, !results.is_empty());
        debug!(
            "Hot cache range query returned {} entries in {}µs",
            results.len(),
            duration_us
        );

        results
    }

    /// Select entries that should leave the cache, oldest first.
    ///
    /// An entry is a candidate when it is older than the retention window or
    /// when the cache holds more than `capacity` entries and the entry is
    /// among the oldest surplus. At most `policy.max_batch` entries are
    /// returned. The cache itself is not modified.
    pub async fn evict_candidates(&self, policy: &EvictionPolicy, now: Timestamp) -> Vec<LogEntry> {
        let index = self.index.read().await;

        let over_capacity = index.len().saturating_sub(policy.capacity);
        let expired = policy
            .retention
            .and_then(|retention| chrono::Duration::from_std(retention).ok())
            .and_then(|retention| now.checked_sub_signed(retention))
            .map(|cutoff| index.range(..(cutoff, 0)).count())
            .unwrap_or(0);

        let take = over_capacity.max(expired).min(policy.max_batch);
        index
            .values()
            .take(take)
            .map(|entry| (**entry).clone())
            .collect()
    }

    /// Drop the given entries from residency. Returns how many were present.
    ///
    /// Callers must only pass entries the cold store has already accepted.
    pub async fn remove(&self, entries: &[LogEntry]) -> usize {
        let removed = {
            let mut index = self.index.write().await;
            entries
                .iter()
                .filter(|entry| index.remove(&entry.order_key()).is_some())
                .count()
        };

        self.eviction_count
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Every resident entry in chronological order.
    pub async fn all(&self) -> Vec<LogEntry> {
        let index = self.index.read().await;
        index.values().map(|entry| (**entry).clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    pub async fn get_metrics(&self) -> TierMetricsSnapshot {
        let record_count = self.len().await as u64;
        self.stats.read().await.snapshot(
            record_count,
            self.eviction_count.load(Ordering::Relaxed),
        )
    }

    pub fn tier_name(&self) -> &'static str {
        "Hot (memory)"
    }

    pub fn target_access_time(&self) -> Duration {
        Duration::from_micros(1000) // 1ms target
    }
}

impl Default for HotCache {
    fn default() -> Self {
        Self::new()
    }
}
