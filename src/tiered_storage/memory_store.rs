//! In-memory implementation of the cold store contract.
//!
//! Useful for embedding and for exercising failure paths: inserts and range
//! queries can be switched to fail, inserts can be delayed after the data is
//! applied to widen the window in which an entry lives in both tiers, and
//! range queries can be slowed down to exercise query deadlines.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::traits::{AccessStats, ColdStore, TierMetricsSnapshot};
use crate::types::{LogEntry, Timestamp};

/// `BTreeMap`-backed cold store.
///
/// Keyed by `(timestamp, sequence)` like the SQLite adapter, so rewriting an
/// entry is a no-op while a re-ingested event gets its own slot.
#[derive(Default)]
pub struct InMemoryColdStore {
    entries: RwLock<BTreeMap<(Timestamp, u64), LogEntry>>,
    stats: RwLock<AccessStats>,
    fail_inserts: AtomicBool,
    fail_queries: AtomicBool,
    insert_delay_ms: AtomicU64,
    query_delay_ms: AtomicU64,
    insert_calls: AtomicU64,
    query_calls: AtomicU64,
}

impl InMemoryColdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail (`true`) or succeed (`false`).
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent range queries fail (`true`) or succeed (`false`).
    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Delay every successful insert by `delay` after the data is visible.
    pub fn set_insert_delay(&self, delay: Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay every range query by `delay` before it reads.
    pub fn set_query_delay(&self, delay: Duration) {
        self.query_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `insert` calls received, failed ones included.
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Number of `range_query` calls received, failed ones included.
    pub fn query_calls(&self) -> u64 {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Every stored entry in chronological order.
    pub async fn all(&self) -> Vec<LogEntry> {
        self.entries.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ColdStore for InMemoryColdStore {
    async fn insert(&self, entries: &[LogEntry]) -> Result<()> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            bail!("in-memory cold store is unavailable for writes");
        }

        {
            let mut stored = self.entries.write().await;
            for entry in entries {
                stored
                    .entry(entry.order_key())
                    .or_insert_with(|| entry.clone());
            }
        }

        let delay_ms = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        Ok(())
    }

    async fn range_query(&self, start: Timestamp, end: Timestamp) -> Result<Vec<LogEntry>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            bail!("in-memory cold store is unavailable for reads");
        }
        if start > end {
            return Ok(Vec::new());
        }

        let delay_ms = self.query_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let started = Instant::now();
        let entries: Vec<LogEntry> = {
            let stored = self.entries.read().await;
            stored
                .range((start, 0)..=(end, u64::MAX))
                .map(|(_, entry)| entry.clone())
                .collect()
        };

        self.stats
            .write()
            .await
            .record(started.elapsed().as_micros() as u64, !entries.is_empty());
        Ok(entries)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn max_sequence(&self) -> Result<Option<u64>> {
        let stored = self.entries.read().await;
        Ok(stored.values().map(LogEntry::sequence).max())
    }

    async fn get_metrics(&self) -> Result<TierMetricsSnapshot> {
        let record_count = self.count().await?;
        Ok(self.stats.read().await.snapshot(record_count, 0))
    }

    fn tier_name(&self) -> &'static str {
        "Cold (memory)"
    }

    fn target_access_time(&self) -> Duration {
        Duration::from_micros(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_rewrite_is_idempotent() {
        let store = InMemoryColdStore::new();
        let first = LogEntry::new(ts(10), "x", "m").assign_sequence(1);
        let again = LogEntry::new(ts(10), "x", "m").assign_sequence(2);

        store.insert(&[first.clone()]).await.unwrap();
        store.insert(&[first.clone()]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        // A second ingestion of the same event is kept alongside the first
        store.insert(&[again.clone()]).await.unwrap();
        assert_eq!(store.all().await, vec![first, again]);
        assert_eq!(store.max_sequence().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_memory_store_failure_switches() {
        let store = InMemoryColdStore::new();
        let entry = LogEntry::new(ts(10), "x", "m").assign_sequence(1);

        store.set_fail_inserts(true);
        assert!(store.insert(&[entry.clone()]).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);

        store.set_fail_inserts(false);
        store.insert(&[entry]).await.unwrap();

        store.set_fail_queries(true);
        assert!(store.range_query(ts(0), ts(100)).await.is_err());
        store.set_fail_queries(false);
        assert_eq!(store.range_query(ts(0), ts(100)).await.unwrap().len(), 1);

        assert_eq!(store.insert_calls(), 2);
        assert_eq!(store.query_calls(), 2);
    }
}
