//! tierlog - tiered storage for structured log entries
//!
//! New entries land in a bounded in-memory hot cache and are later moved to a
//! durable cold store. Range queries read both tiers and merge the results, so
//! every entry in the window is returned exactly once and in order, even while
//! it is being moved between tiers.

pub mod config;
pub mod error;
pub mod merge;
pub mod observability;
pub mod pipeline;
pub mod store;
pub mod tiered_storage;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use config::StoreConfig;
pub use error::{ColdOperation, StoreError, StoreResult};
pub use merge::{InconsistencyPolicy, MergeOutcome, MergeReport, QueryMerger};
pub use pipeline::{EvictionReport, IngestPipeline, PipelineConfig};
pub use store::{TierStats, TieredLogStore};
pub use tiered_storage::{
    ColdStore, EvictionPolicy, HotCache, InMemoryColdStore, SqliteColdStore, StoreMetrics,
    TierMetricsSnapshot,
};
pub use types::{DedupKey, Fields, LogEntry, Timestamp};
