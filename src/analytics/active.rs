//! Distinct active sessions.

use std::collections::HashSet;

use crate::models::EventRecord;

use super::filter::TimeRange;

/// Sessions with at least one record whose last activity lies in `window`.
/// Each session counts once however many records it has.
pub fn count_active(records: &[EventRecord], window: &TimeRange) -> u64 {
    records
        .iter()
        .filter(|record| window.contains(record))
        .map(|record| record.session_id.as_str())
        .collect::<HashSet<_>>()
        .len() as u64
}
