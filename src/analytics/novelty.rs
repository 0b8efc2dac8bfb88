//! First-occurrence ("new" vs "seen") classification of field values.
//!
//! A key is new on a record when no record of the same domain with a
//! strictly earlier `created_at` carries it. Several records sharing the
//! earliest instant of a key are therefore all new.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{sort_chronologically, EventRecord, Field, FieldValues};

use super::models::{Classification, FirstSeen};

/// Fold `records` into one first-seen marker per distinct key of `fields`,
/// ordered by first occurrence, then key.
pub fn first_seen(records: &[EventRecord], fields: &[Field]) -> Vec<FirstSeen> {
    let mut markers: HashMap<FieldValues, (DateTime<Utc>, u64)> = HashMap::new();

    for record in records {
        let Some(key) = record.key(fields) else {
            continue;
        };
        markers
            .entry(key)
            .and_modify(|(earliest, count)| {
                *earliest = (*earliest).min(record.created_at);
                *count += 1;
            })
            .or_insert((record.created_at, 1));
    }

    let mut markers: Vec<FirstSeen> = markers
        .into_iter()
        .map(|(key, (first_seen, count))| FirstSeen {
            key,
            first_seen,
            count,
        })
        .collect();
    sort_first_seen(&mut markers);
    markers
}

/// Canonical order for first-seen markers
pub fn sort_first_seen(markers: &mut [FirstSeen]) {
    markers.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then_with(|| a.key.cmp(&b.key)));
}

/// Classify every record carrying `fields`, in chronological order.
pub fn classify_new(records: &[EventRecord], fields: &[Field]) -> Vec<Classification> {
    let mut ordered: Vec<EventRecord> = records
        .iter()
        .filter(|record| record.has_fields(fields))
        .cloned()
        .collect();
    sort_chronologically(&mut ordered);

    let mut earliest: HashMap<FieldValues, DateTime<Utc>> = HashMap::new();
    ordered
        .into_iter()
        .filter_map(|record| {
            let key = record.key(fields)?;
            let first = *earliest.entry(key.clone()).or_insert(record.created_at);
            Some(Classification {
                key,
                created_at: record.created_at,
                is_new: record.created_at == first,
            })
        })
        .collect()
}
