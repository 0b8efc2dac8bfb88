//! Shapes returned by the aggregations. All of them are computed on read
//! and never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Field, FieldValues};

/// Key of a ranked entry. `Others` serializes as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RankKey {
    Values(FieldValues),
    Others,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub key: RankKey,
    pub count: u64,
}

impl RankedEntry {
    pub fn is_others(&self) -> bool {
        matches!(self.key, RankKey::Others)
    }
}

/// One point of the duration series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationPoint {
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    /// Records in the bucket with a known duration
    pub count: u64,
    /// Mean duration in seconds, 0 for an empty bucket
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveVisitors {
    pub count: u64,
}

/// First occurrence marker for a key within a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstSeen {
    pub key: FieldValues,
    pub first_seen: DateTime<Utc>,
    /// Records carrying the key
    pub count: u64,
}

/// A record's key and whether it was the first occurrence of that key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub key: FieldValues,
    pub created_at: DateTime<Utc>,
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentValue {
    pub key: FieldValues,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldCount {
    pub field: Field,
    pub count: u64,
}
