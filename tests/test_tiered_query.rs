//! Integration tests for range queries across the hot cache and cold store.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tierlog::{
    ColdOperation, ColdStore, Fields, InMemoryColdStore, LogEntry, StoreConfig, StoreError,
    TieredLogStore, Timestamp,
};

fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Config that never evicts on its own during a test
fn quiet_config() -> StoreConfig {
    StoreConfig {
        retention_secs: 0,
        ..StoreConfig::default()
    }
}

async fn memory_store(config: StoreConfig) -> (TieredLogStore, Arc<InMemoryColdStore>) {
    let cold = Arc::new(InMemoryColdStore::new());
    let store = TieredLogStore::with_cold_store(cold.clone(), &config)
        .await
        .unwrap();
    (store, cold)
}

fn stored(secs: i64, tag: &str, message: &str, sequence: u64) -> LogEntry {
    LogEntry::from_stored(ts(secs), tag, message, Fields::new(), sequence)
}

fn payload(version: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("v".to_string(), serde_json::json!(version));
    fields
}

#[tokio::test]
async fn test_merges_entries_from_both_tiers() {
    let (store, cold) = memory_store(quiet_config()).await;
    store.ingest(LogEntry::new(ts(10), "x", "first")).await;
    store.ingest(LogEntry::new(ts(20), "x", "third")).await;
    cold.insert(&[stored(15, "y", "second", 0)]).await.unwrap();

    let results = store.query(ts(5), ts(25)).await.unwrap();
    let times: Vec<i64> = results.iter().map(|e| e.timestamp().timestamp()).collect();
    assert_eq!(times, vec![10, 15, 20]);
    assert_eq!(results[1].tag(), "y");
}

#[tokio::test]
async fn test_entry_in_both_tiers_returned_once() {
    let (store, cold) = memory_store(quiet_config()).await;
    let seq = store.ingest(LogEntry::new(ts(10), "x", "m")).await;
    cold.insert(&[stored(10, "x", "m", seq)]).await.unwrap();

    let results = store.query(ts(0), ts(100)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].message(), "m");
}

#[tokio::test]
async fn test_inverted_range_is_rejected() {
    let (store, cold) = memory_store(quiet_config()).await;
    store.ingest(LogEntry::new(ts(10), "x", "m")).await;

    let err = store.query(ts(25), ts(5)).await.unwrap_err();
    match err {
        StoreError::InvalidRange { start, end } => {
            assert_eq!(start, ts(25));
            assert_eq!(end, ts(5));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cold.query_calls(), 0);
}

#[tokio::test]
async fn test_cold_store_failure_fails_whole_query() {
    let (store, cold) = memory_store(quiet_config()).await;
    store.ingest(LogEntry::new(ts(10), "x", "resident")).await;
    cold.set_fail_queries(true);

    let err = store.query(ts(0), ts(100)).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::ColdStoreUnavailable {
            operation: ColdOperation::RangeQuery,
            ..
        }
    ));
    assert_eq!(store.metrics().query_failures.get(), 1);
}

#[tokio::test]
async fn test_both_tiers_queried_even_when_cache_covers_window() {
    let (store, cold) = memory_store(quiet_config()).await;
    store.ingest(LogEntry::new(ts(10), "x", "m")).await;

    store.query(ts(10), ts(10)).await.unwrap();
    assert_eq!(cold.query_calls(), 1);
}

#[tokio::test]
async fn test_bounds_are_inclusive() {
    let (store, cold) = memory_store(quiet_config()).await;
    store.ingest(LogEntry::new(ts(10), "x", "low")).await;
    cold.insert(&[stored(20, "x", "high", 0)]).await.unwrap();

    let results = store.query(ts(10), ts(20)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(store.query(ts(11), ts(19)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_queries_are_identical() {
    let (store, cold) = memory_store(quiet_config()).await;
    for i in 0..20 {
        store
            .ingest(LogEntry::new(ts(i % 5), "x", format!("hot {}", i)))
            .await;
    }
    cold.insert(&[stored(2, "y", "cold", 0), stored(3, "y", "cold", 0)])
        .await
        .unwrap();

    let first = store.query(ts(0), ts(10)).await.unwrap();
    let second = store.query(ts(0), ts(10)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 22);
}

#[tokio::test]
async fn test_output_ordered_by_timestamp_then_sequence() {
    let config = StoreConfig {
        hot_capacity: 30,
        retention_secs: 0,
        eviction_batch_size: 1000,
        ..StoreConfig::default()
    };
    let (store, _) = memory_store(config).await;

    // Heavy timestamp collisions, half of them moved to the cold tier
    for i in 0..60 {
        let secs = rand::random::<u8>() as i64 % 8;
        store
            .ingest(LogEntry::new(ts(secs), "x", format!("event {}", i)))
            .await;
    }
    store.run_eviction_cycle().await.unwrap();

    let results = store.query(ts(0), ts(10)).await.unwrap();
    assert_eq!(results.len(), 60);
    for pair in results.windows(2) {
        assert!(pair[0].order_key() < pair[1].order_key());
    }
}

#[tokio::test]
async fn test_divergent_copies_surface_as_inconsistency() {
    let (store, cold) = memory_store(quiet_config()).await;
    let seq = store.ingest(LogEntry::new(ts(10), "x", "m")).await;

    let mut fields = Fields::new();
    fields.insert("corrupted".to_string(), serde_json::json!(true));
    cold.insert(&[LogEntry::from_stored(ts(10), "x", "m", fields, seq)])
        .await
        .unwrap();

    let err = store.query(ts(0), ts(100)).await.unwrap_err();
    assert!(matches!(err, StoreError::MergeInconsistency { .. }));
    assert_eq!(store.metrics().merge_inconsistencies.get(), 1);
}

#[tokio::test]
async fn test_prefer_cache_policy_tolerates_divergence() {
    let config = StoreConfig {
        inconsistency_policy: tierlog::InconsistencyPolicy::PreferCache,
        ..quiet_config()
    };
    let (store, cold) = memory_store(config).await;
    let seq = store.ingest(LogEntry::new(ts(10), "x", "m")).await;

    let mut fields = Fields::new();
    fields.insert("stale".to_string(), serde_json::json!(true));
    cold.insert(&[LogEntry::from_stored(ts(10), "x", "m", fields, seq)])
        .await
        .unwrap();

    let results = store.query(ts(0), ts(100)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].fields().is_empty());
}

#[tokio::test]
async fn test_divergent_reingestion_rejected_before_and_after_eviction() {
    let (store, cold) = memory_store(quiet_config()).await;
    store
        .ingest(LogEntry::with_fields(ts(10), "x", "m", payload("A")))
        .await;
    store.drain().await.unwrap();
    store
        .ingest(LogEntry::with_fields(ts(10), "x", "m", payload("B")))
        .await;

    let before = store.query(ts(10), ts(10)).await.unwrap_err();
    assert!(matches!(
        before,
        StoreError::MergeInconsistency { sequence: 2, .. }
    ));

    // Both ingestions are persisted; neither payload is dropped on write
    store.drain().await.unwrap();
    assert_eq!(cold.count().await.unwrap(), 2);

    let after = store.query(ts(10), ts(10)).await.unwrap_err();
    assert!(matches!(after, StoreError::MergeInconsistency { .. }));
    assert_eq!(store.metrics().merge_inconsistencies.get(), 2);
}

#[tokio::test]
async fn test_prefer_cache_answer_stable_across_eviction() {
    let db_path = std::env::temp_dir()
        .join(format!("tierlog_reingest_{}.db", rand::random::<u64>()))
        .to_string_lossy()
        .into_owned();
    let config = StoreConfig {
        retention_secs: 0,
        inconsistency_policy: tierlog::InconsistencyPolicy::PreferCache,
        database_path: db_path,
        pool_size: 2,
        ..StoreConfig::default()
    };
    let store = TieredLogStore::open(&config).await.unwrap();

    store
        .ingest(LogEntry::with_fields(ts(10), "x", "m", payload("A")))
        .await;
    store.drain().await.unwrap();
    let newest = store
        .ingest(LogEntry::with_fields(ts(10), "x", "m", payload("B")))
        .await;

    let before = store.query(ts(10), ts(10)).await.unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].sequence(), newest);
    assert_eq!(before[0].fields(), &payload("B"));
    assert_eq!(store.metrics().merge_inconsistencies.get(), 1);

    assert_eq!(store.drain().await.unwrap(), 1);
    let after = store.query(ts(10), ts(10)).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(store.metrics().merge_inconsistencies.get(), 2);
    assert_eq!(store.stats().await.unwrap().cold_count, 2);
}

#[tokio::test]
async fn test_sqlite_backed_store_end_to_end() {
    let db_path = std::env::temp_dir()
        .join(format!("tierlog_e2e_{}.db", rand::random::<u64>()))
        .to_string_lossy()
        .into_owned();
    let config = StoreConfig {
        hot_capacity: 3,
        retention_secs: 0,
        database_path: db_path,
        pool_size: 4,
        ..StoreConfig::default()
    };
    let store = TieredLogStore::open(&config).await.unwrap();

    for i in 0..8 {
        store
            .ingest(LogEntry::new(ts(100 + i), "app", format!("line {}", i)))
            .await;
    }
    let report = store.run_eviction_cycle().await.unwrap();
    assert_eq!(report.evicted, 5);

    let results = store.query(ts(100), ts(200)).await.unwrap();
    let messages: Vec<&str> = results.iter().map(LogEntry::message).collect();
    assert_eq!(
        messages,
        (0..8).map(|i| format!("line {}", i)).collect::<Vec<_>>()
    );

    let stats = store.stats().await.unwrap();
    assert_eq!((stats.hot_count, stats.cold_count), (3, 5));
}
