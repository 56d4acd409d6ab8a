//! Tiered Storage Module
//!
//! Two storage tiers for log entries:
//! - Hot tier: bounded in-memory, time-ordered cache with <1ms access time
//! - Cold tier: durable, unbounded store behind the [`ColdStore`] trait
//!   (SQLite via sqlx, or an in-memory map for embedding and tests)
//!
//! Entries move from hot to cold only through the eviction cycle in
//! [`crate::pipeline`], which writes to the cold tier before removing.

mod hot_cache;
mod memory_store;
mod metrics;
mod sqlite_store;
mod traits;

// Re-export main types
pub use hot_cache::{EvictionPolicy, HotCache};
pub use memory_store::InMemoryColdStore;
pub use metrics::{AlertSeverity, StoreMetrics, TierAlert, TierMonitor};
pub use sqlite_store::SqliteColdStore;
pub use traits::{ColdStore, TierMetricsSnapshot};
