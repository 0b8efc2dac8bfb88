//! Latest distinct values of a field set.

use std::collections::HashSet;

use crate::models::{EventRecord, Field, FieldValues};

use super::models::RecentValue;

/// Up to `limit` distinct keys, newest first, each with its latest instant.
pub fn recent(records: &[EventRecord], fields: &[Field], limit: usize) -> Vec<RecentValue> {
    let mut ordered: Vec<&EventRecord> = records.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

    let mut seen: HashSet<FieldValues> = HashSet::new();
    ordered
        .into_iter()
        .filter_map(|record| {
            let key = record.key(fields)?;
            seen.insert(key.clone()).then(|| RecentValue {
                key,
                created_at: record.created_at,
            })
        })
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DomainId;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_recent_is_distinct_and_newest_first() {
        let domain = DomainId::random();
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let records = vec![
            EventRecord::new(domain, "1", t0).with(Field::OsName, "Linux"),
            EventRecord::new(domain, "2", t0 + Duration::minutes(1)).with(Field::OsName, "macOS"),
            EventRecord::new(domain, "3", t0 + Duration::minutes(2)).with(Field::OsName, "Linux"),
            EventRecord::new(domain, "4", t0 + Duration::minutes(3)),
        ];

        let values = recent(&records, &[Field::OsName], 10);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].key.get(Field::OsName), Some("Linux"));
        assert_eq!(values[0].created_at, t0 + Duration::minutes(2));
        assert_eq!(values[1].key.get(Field::OsName), Some("macOS"));

        assert_eq!(recent(&records, &[Field::OsName], 1).len(), 1);
    }
}
