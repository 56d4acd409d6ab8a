//! Metrics and Monitoring for Tiered Storage
//!
//! [`StoreMetrics`] holds the prometheus counters updated by ingest, eviction
//! and query paths. [`TierMonitor`] compares per-tier snapshots against their
//! targets and keeps a bounded list of alerts.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::traits::TierMetricsSnapshot;

/// Prometheus instruments for one store instance.
///
/// Each instance owns its registry so several stores (or tests) can coexist
/// in one process.
pub struct StoreMetrics {
    registry: Registry,
    pub entries_ingested: IntCounter,
    pub entries_evicted: IntCounter,
    pub eviction_failures: IntCounter,
    pub queries: IntCounter,
    pub query_failures: IntCounter,
    pub duplicates_collapsed: IntCounter,
    pub merge_inconsistencies: IntCounter,
    pub hot_entries: IntGauge,
    pub query_latency: Histogram,
}

impl StoreMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("tierlog".to_string()), None)?;

        let entries_ingested =
            IntCounter::new("entries_ingested_total", "Entries accepted into the hot cache")?;
        let entries_evicted = IntCounter::new(
            "entries_evicted_total",
            "Entries moved from the hot cache to the cold store",
        )?;
        let eviction_failures = IntCounter::new(
            "eviction_failures_total",
            "Eviction cycles aborted because the cold store rejected the batch",
        )?;
        let queries = IntCounter::new("queries_total", "Range queries served")?;
        let query_failures = IntCounter::new("query_failures_total", "Range queries that failed")?;
        let duplicates_collapsed = IntCounter::new(
            "merge_duplicates_total",
            "Entries dropped by the merge because their identity was already seen",
        )?;
        let merge_inconsistencies = IntCounter::new(
            "merge_inconsistencies_total",
            "Entries whose cache and cold store copies differed",
        )?;
        let hot_entries = IntGauge::new("hot_entries", "Entries resident in the hot cache")?;
        let query_latency = Histogram::with_opts(
            HistogramOpts::new("query_latency_seconds", "End-to-end range query latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        registry.register(Box::new(entries_ingested.clone()))?;
        registry.register(Box::new(entries_evicted.clone()))?;
        registry.register(Box::new(eviction_failures.clone()))?;
        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(query_failures.clone()))?;
        registry.register(Box::new(duplicates_collapsed.clone()))?;
        registry.register(Box::new(merge_inconsistencies.clone()))?;
        registry.register(Box::new(hot_entries.clone()))?;
        registry.register(Box::new(query_latency.clone()))?;

        Ok(Self {
            registry,
            entries_ingested,
            entries_evicted,
            eviction_failures,
            queries,
            query_failures,
            duplicates_collapsed,
            merge_inconsistencies,
            hot_entries,
            query_latency,
        })
    }

    /// Render every instrument in the prometheus text format.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Alert generated when a tier misses its target
#[derive(Debug, Clone)]
pub struct TierAlert {
    pub tier_name: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Maximum capacity utilization before warning
const MAX_CAPACITY_UTIL: f64 = 0.90;
/// Alerts kept in memory
const MAX_ALERTS: usize = 100;

/// Monitor for tracking and alerting on tier metrics
#[derive(Default)]
pub struct TierMonitor {
    alerts: RwLock<Vec<TierAlert>>,
}

impl TierMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one tier snapshot against its access-time target and, for
    /// bounded tiers, its capacity.
    pub async fn check_tier(
        &self,
        tier_name: &str,
        metrics: &TierMetricsSnapshot,
        target: Duration,
        capacity: Option<usize>,
    ) {
        let now = chrono::Utc::now().timestamp();
        let target_us = target.as_micros() as u64;
        let mut raised = Vec::new();

        if metrics.p95_access_time_us > target_us {
            raised.push((
                AlertSeverity::Warning,
                format!(
                    "P95 access time {}µs exceeds target {}µs",
                    metrics.p95_access_time_us, target_us
                ),
            ));
        }

        if metrics.p99_access_time_us > target_us.saturating_mul(2) {
            raised.push((
                AlertSeverity::Critical,
                format!(
                    "P99 access time {}µs exceeds twice the target {}µs",
                    metrics.p99_access_time_us, target_us
                ),
            ));
        }

        if let Some(capacity) = capacity.filter(|c| *c > 0) {
            let utilization = metrics.record_count as f64 / capacity as f64;
            if utilization > MAX_CAPACITY_UTIL {
                raised.push((
                    AlertSeverity::Warning,
                    format!(
                        "Capacity utilization {:.1}% is above {:.0}%",
                        utilization * 100.0,
                        MAX_CAPACITY_UTIL * 100.0
                    ),
                ));
            }
        }

        if raised.is_empty() {
            return;
        }

        let mut alerts = self.alerts.write().await;
        for (severity, message) in raised {
            warn!("{}: {}", tier_name, message);
            alerts.push(TierAlert {
                tier_name: tier_name.to_string(),
                severity,
                message,
                timestamp: now,
            });
        }

        if alerts.len() > MAX_ALERTS {
            let excess = alerts.len() - MAX_ALERTS;
            alerts.drain(0..excess);
        }
    }

    /// Get recent alerts
    pub async fn get_alerts(&self) -> Vec<TierAlert> {
        self.alerts.read().await.clone()
    }

    /// Clear all alerts
    pub async fn clear_alerts(&self) {
        self.alerts.write().await.clear();
    }

    /// Log a summary of metrics
    pub fn log_metrics_summary(&self, hot: &TierMetricsSnapshot, cold: &TierMetricsSnapshot) {
        info!(
            "Hot: {} entries, {:.2}% hit rate, P95: {}µs, {} evicted | Cold: {} entries, {:.2}% hit rate, P95: {}µs",
            hot.record_count,
            hot.hit_rate(),
            hot.p95_access_time_us,
            hot.eviction_count,
            cold.record_count,
            cold.hit_rate(),
            cold.p95_access_time_us,
        );
    }
}
