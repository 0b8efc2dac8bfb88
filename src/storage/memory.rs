use crate::analytics::novelty::{first_seen, sort_first_seen};
use crate::analytics::{FirstSeen, Predicate};
use crate::models::{DomainId, EventRecord, Field, FieldValues};
use crate::storage::{EventStore, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use uuid::Uuid;

/// In-process event store.
///
/// Keeps a per-field first-seen index up to date on every insert so that
/// single-field novelty queries never rescan the history.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<DomainId, Vec<EventRecord>>,
    ids: DashSet<Uuid>,
    first_seen_index: DashMap<(DomainId, Field), HashMap<String, (DateTime<Utc>, u64)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn index(&self, record: &EventRecord) {
        for field in Field::ALL {
            let Some(value) = record.value(field) else {
                continue;
            };
            self.first_seen_index
                .entry((record.domain_id, field))
                .or_default()
                .entry(value.to_string())
                .and_modify(|(earliest, count)| {
                    *earliest = (*earliest).min(record.created_at);
                    *count += 1;
                })
                .or_insert((record.created_at, 1));
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn insert(&self, record: &EventRecord) -> StorageResult<()> {
        record.validate()?;

        // readers of this domain wait on the guard until record and index agree
        let mut history = self.records.entry(record.domain_id).or_default();
        if !self.ids.insert(record.id) {
            return Err(StorageError::Conflict);
        }
        self.index(record);
        history.push(record.clone());

        Ok(())
    }

    async fn query(
        &self,
        domain_id: &DomainId,
        predicate: &Predicate,
    ) -> StorageResult<Vec<EventRecord>> {
        let records = self
            .records
            .get(domain_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|record| predicate.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(records)
    }

    async fn first_seen(
        &self,
        domain_id: &DomainId,
        fields: &[Field],
    ) -> StorageResult<Vec<FirstSeen>> {
        if let [field] = fields {
            let mut markers: Vec<FirstSeen> = self
                .first_seen_index
                .get(&(*domain_id, *field))
                .map(|values| {
                    values
                        .iter()
                        .map(|(value, (earliest, count))| FirstSeen {
                            key: FieldValues::new(vec![(*field, value.clone())]),
                            first_seen: *earliest,
                            count: *count,
                        })
                        .collect()
                })
                .unwrap_or_default();
            sort_first_seen(&mut markers);
            return Ok(markers);
        }

        // composite keys are not indexed
        let history = self
            .records
            .get(domain_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(first_seen(&history, fields))
    }

    async fn has_records(&self, domain_id: &DomainId) -> StorageResult<bool> {
        Ok(self
            .records
            .get(domain_id)
            .is_some_and(|entry| !entry.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::filter::scope;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_and_query() {
        let store = MemoryStore::new();
        let domain = DomainId::random();
        let other = DomainId::random();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        store
            .insert(&EventRecord::new(domain, "a", t0).with(Field::OsName, "Linux"))
            .await
            .unwrap();
        store.insert(&EventRecord::new(domain, "b", t0)).await.unwrap();
        store.insert(&EventRecord::new(other, "c", t0)).await.unwrap();

        let all = store.query(&domain, &scope(domain, None, &[])).await.unwrap();
        assert_eq!(all.len(), 2);

        let with_os = store
            .query(&domain, &scope(domain, None, &[Field::OsName]))
            .await
            .unwrap();
        assert_eq!(with_os.len(), 1);

        let unknown = DomainId::random();
        assert!(store.query(&unknown, &scope(unknown, None, &[])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let store = MemoryStore::new();
        let record = EventRecord::new(DomainId::random(), "a", Utc::now());
        store.insert(&record).await.unwrap();
        assert!(matches!(store.insert(&record).await, Err(StorageError::Conflict)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_index_matches_scan() {
        let store = MemoryStore::new();
        let domain = DomainId::random();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let records = vec![
            EventRecord::new(domain, "a", t0 + Duration::hours(3)).with(Field::Country, "DE"),
            EventRecord::new(domain, "b", t0 + Duration::hours(1)).with(Field::Country, "FR"),
            EventRecord::new(domain, "c", t0).with(Field::Country, "DE"),
            EventRecord::new(domain, "d", t0 + Duration::hours(2)),
        ];
        for record in &records {
            store.insert(record).await.unwrap();
        }

        let indexed = store.first_seen(&domain, &[Field::Country]).await.unwrap();
        assert_eq!(indexed, first_seen(&records, &[Field::Country]));
        assert_eq!(indexed[0].key.get(Field::Country), Some("DE"));
        assert_eq!(indexed[0].count, 2);
    }

    #[tokio::test]
    async fn test_invalid_duration_is_rejected() {
        let store = MemoryStore::new();
        let domain = DomainId::random();

        for seconds in [i64::MAX, -1] {
            let record = EventRecord::new(domain, "a", Utc::now()).with_duration(seconds);
            assert!(matches!(store.insert(&record).await, Err(StorageError::Invalid(_))));
        }
        assert!(store.is_empty());
        assert!(!store.has_records(&domain).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_keep_index_consistent() {
        let store = Arc::new(MemoryStore::new());
        let domain = DomainId::random();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let duplicate = EventRecord::new(domain, "dup", t0).with(Field::Country, "NL");

        let mut handles = vec![];
        for i in 0..20 {
            let store = Arc::clone(&store);
            let duplicate = duplicate.clone();
            handles.push(tokio::spawn(async move {
                let record = EventRecord::new(domain, format!("s{i}"), t0 + Duration::minutes(i))
                    .with(Field::Country, if i % 2 == 0 { "DE" } else { "FR" });
                store.insert(&record).await.unwrap();
                store.insert(&duplicate).await.is_ok()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(store.len(), 21);

        let history = store.query(&domain, &scope(domain, None, &[])).await.unwrap();
        assert_eq!(history.len(), 21);
        let indexed = store.first_seen(&domain, &[Field::Country]).await.unwrap();
        assert_eq!(indexed, first_seen(&history, &[Field::Country]));
        assert_eq!(indexed.iter().map(|marker| marker.count).sum::<u64>(), 21);
    }
}
