//! Example demonstrating the tiered log store
//!
//! Ingests a burst of entries into a small hot cache backed by SQLite, lets the
//! background eviction loop move the surplus to the cold store, and runs range
//! queries that span both tiers.
//!
//! Run with: cargo run --example demo_tiered_log

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tierlog::observability::{init_observability, ObservabilityConfig};
use tierlog::{Fields, LogEntry, StoreConfig, TieredLogStore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let db_path = std::env::temp_dir().join(format!("tierlog_demo_{}.db", std::process::id()));
    let config = StoreConfig {
        hot_capacity: 50,
        retention_secs: 300,
        eviction_interval_ms: 100,
        eviction_batch_size: 20,
        database_path: db_path.to_string_lossy().into_owned(),
        pool_size: 4,
        ..StoreConfig::default()
    };
    init_observability(Some(ObservabilityConfig::from_store_config(&config)))?;

    println!("=== Tiered Log Store Demo ===\n");

    let store = TieredLogStore::open(&config).await?;
    let shutdown = CancellationToken::new();
    let eviction_loop = store.start_eviction_loop(shutdown.clone());
    println!("✓ Store opened at {}\n", config.database_path);

    // Ingest a burst spread over the last ten minutes
    println!("--- Ingesting ---");
    let base = Utc::now() - ChronoDuration::minutes(10);
    let tags = ["http", "db", "auth", "worker"];
    for i in 0..200i64 {
        let mut fields = Fields::new();
        fields.insert("request_id".to_string(), serde_json::json!(format!("req-{:04}", i)));
        fields.insert("latency_ms".to_string(), serde_json::json!(i % 97));

        let entry = LogEntry::with_fields(
            base + ChronoDuration::seconds(i * 3),
            tags[i as usize % tags.len()],
            format!("handled request {}", i),
            fields,
        );
        store.ingest(entry).await;
    }
    println!("✓ Ingested 200 entries");

    // Let the background loop catch up
    sleep(Duration::from_millis(500)).await;
    let stats = store.stats().await?;
    println!(
        "✓ Hot: {} entries, Cold: {} entries\n",
        stats.hot_count, stats.cold_count
    );

    println!("--- Querying ---");
    let all = store.query(base, Utc::now()).await?;
    println!("Full window: {} entries (each exactly once)", all.len());

    let window_start = base + ChronoDuration::seconds(120);
    let window_end = base + ChronoDuration::seconds(180);
    let window = store.query(window_start, window_end).await?;
    println!("One-minute window: {} entries", window.len());
    for entry in window.iter().take(5) {
        println!(
            "  {} [{}] {} (seq {})",
            entry.timestamp().format("%H:%M:%S"),
            entry.tag(),
            entry.message(),
            entry.sequence()
        );
    }

    match store.query(window_end, window_start).await {
        Err(e) => println!("Inverted window rejected: {}\n", e),
        Ok(_) => println!("Inverted window unexpectedly accepted\n"),
    }

    println!("--- Maintenance ---");
    store.run_maintenance().await?;
    for alert in store.get_alerts().await {
        println!("  {:?} {}: {}", alert.severity, alert.tier_name, alert.message);
    }

    println!("\n--- Shutdown ---");
    shutdown.cancel();
    eviction_loop.await?;
    let drained = store.drain().await?;
    let stats = store.stats().await?;
    println!(
        "✓ Drained {} entries; Hot: {}, Cold: {}",
        drained, stats.hot_count, stats.cold_count
    );

    println!("\n--- Metrics ---");
    println!("{}", store.metrics().gather_text());

    let _ = std::fs::remove_file(&db_path);
    Ok(())
}
