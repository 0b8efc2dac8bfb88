//! Top-N ranking of composite field keys.

use std::collections::HashMap;

use crate::models::{EventRecord, Field, FieldValues};

use super::error::{AggregationError, AggregationResult};
use super::models::{RankKey, RankedEntry};

/// Rank keys of `fields` across `records` by occurrence count.
///
/// Records missing any of `fields` are skipped. Equal counts keep the order
/// in which their keys first appear in `records`, so callers sort the input
/// first. When there are more distinct keys than `limit`, the tail beyond
/// the top `limit - 1` is folded into a trailing [`RankKey::Others`] entry.
pub fn rank(
    records: &[EventRecord],
    fields: &[Field],
    limit: usize,
) -> AggregationResult<Vec<RankedEntry>> {
    if fields.is_empty() {
        return Err(AggregationError::invalid("at least one field is required"));
    }
    if limit == 0 {
        return Err(AggregationError::invalid("rank limit must be at least 1"));
    }

    let mut positions: HashMap<FieldValues, usize> = HashMap::new();
    let mut counts: Vec<(FieldValues, u64)> = Vec::new();

    for key in records.iter().filter_map(|record| record.key(fields)) {
        match positions.get(&key) {
            Some(&position) => counts[position].1 += 1,
            None => {
                positions.insert(key.clone(), counts.len());
                counts.push((key, 1));
            }
        }
    }

    // stable: ties stay in first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let others = if counts.len() > limit {
        let folded = counts.split_off(limit - 1);
        Some(folded.iter().map(|(_, count)| count).sum())
    } else {
        None
    };

    let mut ranked: Vec<RankedEntry> = counts
        .into_iter()
        .map(|(key, count)| RankedEntry {
            key: RankKey::Values(key),
            count,
        })
        .collect();

    if let Some(count) = others {
        ranked.push(RankedEntry {
            key: RankKey::Others,
            count,
        });
    }

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DomainId;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn referrers(values: &[&str]) -> Vec<EventRecord> {
        let domain = DomainId::random();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                EventRecord::new(domain, format!("s{i}"), t0 + Duration::seconds(i as i64))
                    .with(Field::SiteReferrer, *value)
            })
            .collect()
    }

    fn key_of(entry: &RankedEntry) -> Option<&str> {
        match &entry.key {
            RankKey::Values(values) => values.get(Field::SiteReferrer),
            RankKey::Others => None,
        }
    }

    #[test]
    fn test_rank_counts_and_orders() {
        let records = referrers(&["a", "a", "b"]);
        let ranked = rank(&records, &[Field::SiteReferrer], 10).unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!((key_of(&ranked[0]), ranked[0].count), (Some("a"), 2));
        assert_eq!((key_of(&ranked[1]), ranked[1].count), (Some("b"), 1));
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let records = referrers(&["c", "b", "a", "b", "c", "a"]);
        let ranked = rank(&records, &[Field::SiteReferrer], 10).unwrap();
        let keys: Vec<_> = ranked.iter().map(key_of).collect();
        assert_eq!(keys, vec![Some("c"), Some("b"), Some("a")]);
    }

    #[test]
    fn test_others_folds_the_tail() {
        let records = referrers(&["a", "a", "a", "b", "b", "c", "d", "d", "e"]);
        let ranked = rank(&records, &[Field::SiteReferrer], 3).unwrap();

        assert_eq!(ranked.len(), 3);
        assert_eq!((key_of(&ranked[0]), ranked[0].count), (Some("a"), 3));
        assert_eq!((key_of(&ranked[1]), ranked[1].count), (Some("b"), 2));
        assert!(ranked[2].is_others());
        assert_eq!(ranked[2].count, 4);
    }

    #[test]
    fn test_exactly_limit_keys_has_no_others() {
        let records = referrers(&["a", "b", "c"]);
        let ranked = rank(&records, &[Field::SiteReferrer], 3).unwrap();
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|entry| !entry.is_others()));
    }

    #[test]
    fn test_records_missing_a_field_are_skipped() {
        let mut records = referrers(&["a"]);
        records[0].os_name = Some("Linux".to_string());
        records.extend(referrers(&["a"]));

        let ranked = rank(&records, &[Field::SiteReferrer, Field::OsName], 10).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].count, 1);
    }

    #[test]
    fn test_rejects_empty_fields_and_zero_limit() {
        let records = referrers(&["a"]);
        assert!(matches!(rank(&records, &[], 10), Err(AggregationError::InvalidArgument(_))));
        assert!(matches!(
            rank(&records, &[Field::SiteReferrer], 0),
            Err(AggregationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_others_serializes_as_null_key() {
        let records = referrers(&["a", "b"]);
        let ranked = rank(&records, &[Field::SiteReferrer], 1).unwrap();
        let json = serde_json::to_value(&ranked).unwrap();
        assert_eq!(json, serde_json::json!([{ "key": null, "count": 2 }]));
    }

    proptest! {
        #[test]
        fn prop_rank_invariants(
            picks in proptest::collection::vec(0u8..12, 0..80),
            limit in 1usize..8,
        ) {
            let names: Vec<String> = picks.iter().map(|p| format!("r{p}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let records = referrers(&refs);
            let ranked = rank(&records, &[Field::SiteReferrer], limit).unwrap();

            let distinct = {
                let mut seen = picks.clone();
                seen.sort();
                seen.dedup();
                seen.len()
            };
            let total: u64 = ranked.iter().map(|entry| entry.count).sum();
            prop_assert_eq!(total, records.len() as u64);

            if distinct <= limit {
                prop_assert_eq!(ranked.len(), distinct);
                prop_assert!(ranked.iter().all(|entry| !entry.is_others()));
            } else {
                prop_assert_eq!(ranked.len(), limit);
                prop_assert!(ranked[limit - 1].is_others());
            }

            let named: Vec<&RankedEntry> = ranked.iter().filter(|entry| !entry.is_others()).collect();
            for pair in named.windows(2) {
                prop_assert!(pair[0].count >= pair[1].count);
                if pair[0].count == pair[1].count {
                    let first = |entry: &RankedEntry| {
                        let key = key_of(entry).unwrap();
                        refs.iter().position(|r| *r == key).unwrap()
                    };
                    prop_assert!(first(pair[0]) < first(pair[1]));
                }
            }
        }
    }
}
