//! Core log entry model shared by every tier.
//!
//! A [`LogEntry`] is immutable once built. Its identity for deduplication is
//! the `(timestamp, tag, message)` triple exposed through [`DedupKey`]; its
//! position in results is given by [`LogEntry::order_key`] (timestamp first,
//! insertion sequence second).

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Instant attached to every entry, normalised to microsecond precision.
pub type Timestamp = DateTime<Utc>;

/// Structured payload carried alongside the message. Opaque to the store.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Number of sub-second digits kept on timestamps (microseconds).
const TIMESTAMP_PRECISION_DIGITS: u16 = 6;

/// Truncate an instant to the precision every tier stores.
pub fn normalize_timestamp(ts: Timestamp) -> Timestamp {
    ts.trunc_subsecs(TIMESTAMP_PRECISION_DIGITS)
}

/// Build a timestamp from microseconds since the Unix epoch.
pub fn timestamp_from_micros(micros: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_micros(micros)
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    Timestamp::deserialize(deserializer).map(normalize_timestamp)
}

/// A single structured log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(deserialize_with = "deserialize_timestamp")]
    timestamp: Timestamp,
    tag: String,
    message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: Fields,
    /// Insertion sequence, assigned at ingest. Zero until then.
    #[serde(default)]
    sequence: u64,
}

/// Borrowed `(timestamp, tag, message)` identity of an entry.
///
/// Two entries with equal keys are treated as the same log event even when
/// their structured fields differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub timestamp: Timestamp,
    pub tag: &'a str,
    pub message: &'a str,
}

impl LogEntry {
    /// Create an entry without structured fields.
    pub fn new(timestamp: Timestamp, tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: normalize_timestamp(timestamp),
            tag: tag.into(),
            message: message.into(),
            fields: Fields::new(),
            sequence: 0,
        }
    }

    /// Create an entry carrying structured fields.
    pub fn with_fields(
        timestamp: Timestamp,
        tag: impl Into<String>,
        message: impl Into<String>,
        fields: Fields,
    ) -> Self {
        Self {
            fields,
            ..Self::new(timestamp, tag, message)
        }
    }

    /// Rebuild an entry that was previously persisted, sequence included.
    ///
    /// Intended for cold store adapters decoding their own rows.
    pub fn from_stored(
        timestamp: Timestamp,
        tag: impl Into<String>,
        message: impl Into<String>,
        fields: Fields,
        sequence: u64,
    ) -> Self {
        Self {
            sequence,
            ..Self::with_fields(timestamp, tag, message, fields)
        }
    }

    pub(crate) fn assign_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Identity used to collapse copies of the same event across tiers.
    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            timestamp: self.timestamp,
            tag: &self.tag,
            message: &self.message,
        }
    }

    /// Sort key: timestamp, then insertion sequence.
    pub fn order_key(&self) -> (Timestamp, u64) {
        (self.timestamp, self.sequence)
    }

    /// Total chronological order used for every result sequence.
    pub fn chronological_cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }

    /// Whether the entry falls in the inclusive window `[start, end]`.
    pub fn in_window(&self, start: Timestamp, end: Timestamp) -> bool {
        start <= self.timestamp && self.timestamp <= end
    }
}
