//! Query merger
//!
//! Combines the hot cache and cold store results of one range query into a
//! single deduplicated, chronologically ordered list.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::types::{DedupKey, LogEntry};

/// What to do when two copies of one dedup key carry different fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyPolicy {
    /// Fail the query with [`StoreError::MergeInconsistency`].
    #[default]
    Reject,
    /// Keep the most recently ingested copy and log a warning. Eviction moves
    /// the oldest entries first, so this is the cache copy whenever the cache
    /// holds one, and the answer does not change once it is evicted.
    PreferCache,
}

/// Counters describing one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub from_cache: usize,
    pub from_store: usize,
    /// Entries dropped because their identity had already been emitted.
    pub duplicates: usize,
    /// Tolerated payload mismatches (`PreferCache` only).
    pub inconsistencies: usize,
}

/// Merged entries plus the counters that produced them.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub entries: Vec<LogEntry>,
    pub report: MergeReport,
}

/// Seen-set merge of cache and store results.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryMerger {
    policy: InconsistencyPolicy,
}

impl QueryMerger {
    pub fn new(policy: InconsistencyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> InconsistencyPolicy {
        self.policy
    }

    /// Merge both sources, emitting one entry per dedup key.
    ///
    /// Cache entries are visited first. Among copies of one key the highest
    /// insertion sequence is kept; on equal sequences (one physical entry
    /// caught mid-eviction) the cache copy is kept. Copies with identical
    /// fields collapse silently. Copies whose fields differ, whichever tier or
    /// ingestion they come from, go through the configured
    /// [`InconsistencyPolicy`].
    pub fn merge(&self, cached: Vec<LogEntry>, stored: Vec<LogEntry>) -> StoreResult<MergeOutcome> {
        let mut report = MergeReport::default();
        let cache_len = cached.len();
        let candidates: Vec<LogEntry> = cached.into_iter().chain(stored).collect();
        let mut keep = vec![false; candidates.len()];

        {
            let mut seen: HashMap<DedupKey<'_>, usize> = HashMap::with_capacity(candidates.len());

            for (i, entry) in candidates.iter().enumerate() {
                match seen.entry(entry.dedup_key()) {
                    Entry::Vacant(slot) => {
                        slot.insert(i);
                        keep[i] = true;
                    }
                    Entry::Occupied(mut slot) => {
                        report.duplicates += 1;
                        let kept = &candidates[*slot.get()];
                        if kept.fields() != entry.fields() {
                            self.on_inconsistency(kept, entry, &mut report)?;
                        }
                        if entry.sequence() > kept.sequence() {
                            keep[*slot.get()] = false;
                            keep[i] = true;
                            slot.insert(i);
                        }
                    }
                }
            }
        }

        let mut entries = Vec::with_capacity(candidates.len() - report.duplicates);
        for (i, (entry, kept)) in candidates.into_iter().zip(keep).enumerate() {
            if !kept {
                continue;
            }
            if i < cache_len {
                report.from_cache += 1;
            } else {
                report.from_store += 1;
            }
            entries.push(entry);
        }

        entries.sort_by(LogEntry::chronological_cmp);

        debug!(
            "Merged {} cache + {} store entries ({} duplicates collapsed)",
            report.from_cache, report.from_store, report.duplicates
        );

        Ok(MergeOutcome { entries, report })
    }

    fn on_inconsistency(
        &self,
        kept: &LogEntry,
        other: &LogEntry,
        report: &mut MergeReport,
    ) -> StoreResult<()> {
        match self.policy {
            InconsistencyPolicy::Reject => Err(StoreError::MergeInconsistency {
                timestamp: kept.timestamp(),
                tag: kept.tag().to_string(),
                message: kept.message().to_string(),
                sequence: kept.sequence(),
            }),
            InconsistencyPolicy::PreferCache => {
                warn!(
                    "Divergent copies of ({}, {:?}, {:?}) at seq {} and {}; keeping seq {}",
                    kept.timestamp(),
                    kept.tag(),
                    kept.message(),
                    kept.sequence(),
                    other.sequence(),
                    kept.sequence().max(other.sequence())
                );
                report.inconsistencies += 1;
                Ok(())
            }
        }
    }
}
