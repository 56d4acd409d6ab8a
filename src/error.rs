//! Error taxonomy surfaced to callers of the tiered store.
//!
//! Adapters (cold stores, configuration loading) report failures with
//! `anyhow`; the core converts them into [`StoreError`] so callers can match
//! on the failure category.

use std::time::Duration;

use crate::types::Timestamp;

/// Errors returned by query, ingest and eviction operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The query window is inverted. Neither tier was consulted.
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: Timestamp, end: Timestamp },

    /// The cold store rejected a read or write.
    #[error("Cold store unavailable during {operation}: {source:#}")]
    ColdStoreUnavailable {
        operation: ColdOperation,
        #[source]
        source: anyhow::Error,
    },

    /// The same physical entry carries different payloads in the two tiers.
    #[error(
        "Merge inconsistency for ({timestamp}, {tag:?}, {message:?}) at sequence {sequence}: \
         cache and cold store copies differ"
    )]
    MergeInconsistency {
        timestamp: Timestamp,
        tag: String,
        message: String,
        sequence: u64,
    },

    /// The query did not complete within the configured deadline.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The store's metrics registry could not be built.
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Cold store call that failed, carried by [`StoreError::ColdStoreUnavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColdOperation {
    Open,
    Insert,
    RangeQuery,
    Metadata,
    Maintenance,
}

impl std::fmt::Display for ColdOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColdOperation::Open => write!(f, "open"),
            ColdOperation::Insert => write!(f, "insert"),
            ColdOperation::RangeQuery => write!(f, "range query"),
            ColdOperation::Metadata => write!(f, "metadata read"),
            ColdOperation::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl StoreError {
    pub(crate) fn cold(operation: ColdOperation, source: anyhow::Error) -> Self {
        StoreError::ColdStoreUnavailable { operation, source }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::ColdStoreUnavailable { .. } | StoreError::Timeout(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
