//! SQLite Cold Store (durable tier)
//!
//! Persistent log storage backed by SQLite with connection pooling and an
//! index on the timestamp column for range scans.
//! Target access time: <10ms

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::traits::{AccessStats, ColdStore, TierMetricsSnapshot};
use crate::types::{timestamp_from_micros, Fields, LogEntry, Timestamp};

/// Cold store using SQLite.
///
/// Rows are unique on `(timestamp, sequence)`, the position of one physical
/// entry; rewriting a stored position is ignored, which makes a retried
/// eviction batch idempotent. Separate ingestions of one dedup key keep their
/// own rows. Every batch is written in one transaction.
pub struct SqliteColdStore {
    pool: Pool<Sqlite>,
    stats: RwLock<AccessStats>,
    db_path: String,
}

impl SqliteColdStore {
    /// Open (or create) a cold store
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `pool_size` - Maximum number of connections in the pool
    pub async fn new(db_path: &str, pool_size: u32) -> Result<Self> {
        info!(
            "Initializing SqliteColdStore at: {} with pool size: {}",
            db_path, pool_size
        );

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self {
            pool,
            stats: RwLock::new(AccessStats::default()),
            db_path: db_path.to_string(),
        };

        store.initialize_schema().await?;

        Ok(store)
    }

    /// Open with default settings
    pub async fn with_defaults() -> Result<Self> {
        Self::new("./tierlog_cold.db", 10).await
    }

    /// Path of the underlying database file
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS log_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_us INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                tag TEXT NOT NULL,
                message TEXT NOT NULL,
                fields TEXT NOT NULL,
                stored_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create log_entries table")?;

        // One row per physical entry; separate ingestions of an event coexist
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_log_position ON log_entries(timestamp_us, sequence);",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create idx_log_position index")?;

        info!("Cold store schema initialized");
        Ok(())
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LogEntry> {
        let timestamp_us: i64 = row.try_get("timestamp_us")?;
        let sequence: i64 = row.try_get("sequence")?;
        let tag: String = row.try_get("tag")?;
        let message: String = row.try_get("message")?;
        let fields_json: String = row.try_get("fields")?;

        let timestamp = timestamp_from_micros(timestamp_us)
            .with_context(|| format!("Stored timestamp out of range: {}", timestamp_us))?;
        let fields: Fields =
            serde_json::from_str(&fields_json).context("Failed to decode stored fields")?;

        Ok(LogEntry::from_stored(
            timestamp,
            tag,
            message,
            fields,
            sequence as u64,
        ))
    }
}

#[async_trait]
impl ColdStore for SqliteColdStore {
    async fn insert(&self, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin cold store transaction")?;

        for entry in entries {
            let fields_json = serde_json::to_string(entry.fields())?;
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO log_entries (
                    timestamp_us, sequence, tag, message, fields, stored_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.timestamp().timestamp_micros())
            .bind(entry.sequence() as i64)
            .bind(entry.tag())
            .bind(entry.message())
            .bind(fields_json)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert entry into cold store")?;
        }

        tx.commit()
            .await
            .context("Failed to commit cold store transaction")?;

        debug!("Cold store accepted {} entries", entries.len());
        Ok(())
    }

    async fn range_query(&self, start: Timestamp, end: Timestamp) -> Result<Vec<LogEntry>> {
        let started = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT timestamp_us, sequence, tag, message, fields
            FROM log_entries
            WHERE timestamp_us >= ? AND timestamp_us <= ?
            ORDER BY timestamp_us ASC, sequence ASC
            "#,
        )
        .bind(start.timestamp_micros())
        .bind(end.timestamp_micros())
        .fetch_all(&self.pool)
        .await
        .context("Failed to range query cold store")?;

        let entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;

        let duration_us = started.elapsed().as_micros() as u64;
        self.stats
            .write()
            .await
            .record(duration_us, !entries.is_empty());
        debug!(
            "Cold store range query returned {} entries in {}µs",
            entries.len(),
            duration_us
        );

        Ok(entries)
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM log_entries")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count entries in cold store")?;

        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    async fn max_sequence(&self) -> Result<Option<u64>> {
        let row = sqlx::query("SELECT MAX(sequence) as max_seq FROM log_entries")
            .fetch_one(&self.pool)
            .await
            .context("Failed to read max sequence from cold store")?;

        let max_seq: Option<i64> = row.try_get("max_seq")?;
        Ok(max_seq.map(|seq| seq as u64))
    }

    async fn get_metrics(&self) -> Result<TierMetricsSnapshot> {
        let record_count = self.count().await?;
        Ok(self.stats.read().await.snapshot(record_count, 0))
    }

    async fn maintenance(&self) -> Result<()> {
        // Refresh statistics for the query planner
        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze cold store")?;

        debug!("Cold store maintenance completed");
        Ok(())
    }

    fn tier_name(&self) -> &'static str {
        "Cold (sqlite)"
    }

    fn target_access_time(&self) -> Duration {
        Duration::from_millis(10) // 10ms target
    }
}
