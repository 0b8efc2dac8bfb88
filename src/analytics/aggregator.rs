//! The aggregation service.
//!
//! Each call scopes a predicate, reads the matching records from the store
//! and shapes them with one of the pure components. Calls share no mutable
//! state, so any number of them may run at once against the same domain.
//!
//! Every call races against its cancellation token and the configured
//! `ttl`; when either fires the store read and the computation are dropped
//! and [`AggregationError::Canceled`] is returned, never a partial result.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::AggregationConfig;
use crate::models::{sort_chronologically, DomainId, Field};
use crate::storage::EventStore;

use super::active::count_active;
use super::durations::bucket_durations;
use super::error::{AggregationError, AggregationResult};
use super::filter::{scope, TimeRange};
use super::models::{
    ActiveVisitors, Classification, DurationPoint, FieldCount, FirstSeen, RankedEntry, RecentValue,
};
use super::novelty::classify_new;
use super::ranker::rank;
use super::recent::recent;
use super::window::{buckets_for, Interval, Range};

pub struct Aggregator {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    config: AggregationConfig,
}

fn require_fields(fields: &[Field]) -> AggregationResult<()> {
    if fields.is_empty() {
        return Err(AggregationError::invalid("at least one field is required"));
    }
    Ok(())
}

impl Aggregator {
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>, config: AggregationConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Current instant of the injected clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn guarded<T, F>(
        &self,
        operation: &'static str,
        domain_id: &DomainId,
        cancel: &CancellationToken,
        work: F,
    ) -> AggregationResult<T>
    where
        F: Future<Output = AggregationResult<T>>,
    {
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AggregationError::Canceled),
            result = tokio::time::timeout(self.config.ttl, work) => {
                result.unwrap_or(Err(AggregationError::Canceled))
            }
        };

        let elapsed = started.elapsed();
        match &outcome {
            Ok(_) => debug!("{operation} for domain {domain_id} finished in {elapsed:?}"),
            Err(AggregationError::InvalidArgument(reason)) => {
                debug!("{operation} for domain {domain_id} rejected: {reason}")
            }
            Err(AggregationError::Canceled) => {
                warn!("{operation} for domain {domain_id} canceled after {elapsed:?}")
            }
            Err(AggregationError::StoreUnavailable(e)) => {
                warn!("{operation} for domain {domain_id} failed: {e}")
            }
        }

        outcome
    }

    /// `false` when the domain has never recorded anything
    async fn has_records(&self, domain_id: &DomainId) -> AggregationResult<bool> {
        Ok(self.store.has_records(domain_id).await?)
    }

    /// Distinct sessions active in the trailing window ending at `reference`.
    /// Empty when nobody is active.
    pub async fn active_visitors(
        &self,
        domain_id: &DomainId,
        reference: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> AggregationResult<Vec<ActiveVisitors>> {
        self.guarded("active_visitors", domain_id, cancel, async {
            let window = chrono::Duration::from_std(self.config.active_window)
                .map_err(|_| AggregationError::invalid("active window out of range"))?;
            let range = TimeRange::active_between(reference - window, reference);

            let records = self
                .store
                .query(domain_id, &scope(*domain_id, Some(range), &[]))
                .await?;

            let count = count_active(&records, &range);
            debug!("{} records in active window, {count} sessions", records.len());

            Ok(if count == 0 {
                Vec::new()
            } else {
                vec![ActiveVisitors { count }]
            })
        })
        .await
    }

    /// Average visit duration for `count` buckets of `interval`, ending with
    /// the bucket containing `reference`. Zero-filled, except for a domain
    /// without any records, which yields an empty series.
    pub async fn durations(
        &self,
        domain_id: &DomainId,
        interval: Interval,
        count: usize,
        reference: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> AggregationResult<Vec<DurationPoint>> {
        self.guarded("durations", domain_id, cancel, async {
            let buckets = buckets_for(interval, count, reference)?;
            let (Some(first), Some(last)) = (buckets.first(), buckets.last()) else {
                return Ok(Vec::new());
            };
            let range = TimeRange::created_between(first.start, last.end);

            let records = self
                .store
                .query(domain_id, &scope(*domain_id, Some(range), &[]))
                .await?;

            if records.is_empty() && !self.has_records(domain_id).await? {
                return Ok(Vec::new());
            }

            Ok(bucket_durations(&records, &buckets))
        })
        .await
    }

    /// Distinct keys of `fields` ordered by first occurrence, newest first
    pub async fn new_records(
        &self,
        domain_id: &DomainId,
        fields: &[Field],
        cancel: &CancellationToken,
    ) -> AggregationResult<Vec<FirstSeen>> {
        self.guarded("new_records", domain_id, cancel, async {
            require_fields(fields)?;

            let mut markers = self.store.first_seen(domain_id, fields).await?;
            markers.sort_by(|a, b| b.first_seen.cmp(&a.first_seen).then_with(|| a.key.cmp(&b.key)));
            markers.truncate(self.config.entries_limit);

            Ok(markers)
        })
        .await
    }

    /// Per field, how many distinct values were first seen inside `range`
    pub async fn new_value_counts(
        &self,
        domain_id: &DomainId,
        fields: &[Field],
        range: Range,
        reference: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> AggregationResult<Vec<FieldCount>> {
        self.guarded("new_value_counts", domain_id, cancel, async {
            require_fields(fields)?;
            let start = range.start(reference)?;

            let mut counts = Vec::with_capacity(fields.len());
            let mut seen_any = false;
            for field in fields {
                let markers = self.store.first_seen(domain_id, &[*field]).await?;
                seen_any |= !markers.is_empty();
                let count = markers
                    .iter()
                    .filter(|marker| start <= marker.first_seen && marker.first_seen < reference)
                    .count() as u64;
                counts.push(FieldCount {
                    field: *field,
                    count,
                });
            }

            if !seen_any && !self.has_records(domain_id).await? {
                return Ok(Vec::new());
            }

            Ok(counts)
        })
        .await
    }

    /// Every record carrying `fields`, chronologically, flagged new or seen
    pub async fn classify_new(
        &self,
        domain_id: &DomainId,
        fields: &[Field],
        cancel: &CancellationToken,
    ) -> AggregationResult<Vec<Classification>> {
        self.guarded("classify_new", domain_id, cancel, async {
            require_fields(fields)?;

            let records = self
                .store
                .query(domain_id, &scope(*domain_id, None, fields))
                .await?;

            Ok(classify_new(&records, fields))
        })
        .await
    }

    /// Latest distinct keys of `fields`, newest first
    pub async fn recent_records(
        &self,
        domain_id: &DomainId,
        fields: &[Field],
        cancel: &CancellationToken,
    ) -> AggregationResult<Vec<RecentValue>> {
        self.guarded("recent_records", domain_id, cancel, async {
            require_fields(fields)?;

            let records = self
                .store
                .query(domain_id, &scope(*domain_id, None, fields))
                .await?;

            Ok(recent(&records, fields, self.config.entries_limit))
        })
        .await
    }

    /// Most frequent keys of `fields` within `range` ending at `reference`.
    /// `limit` defaults to the configured rank limit.
    pub async fn top_records(
        &self,
        domain_id: &DomainId,
        fields: &[Field],
        range: Range,
        limit: Option<usize>,
        reference: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> AggregationResult<Vec<RankedEntry>> {
        self.guarded("top_records", domain_id, cancel, async {
            require_fields(fields)?;
            let limit = limit.unwrap_or(self.config.rank_limit);
            let start = range.start(reference)?;

            let predicate = scope(
                *domain_id,
                Some(TimeRange::created_between(start, reference)),
                fields,
            );
            let mut records = self.store.query(domain_id, &predicate).await?;
            sort_chronologically(&mut records);

            rank(&records, fields, limit)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::EventRecord;
    use crate::storage::{MemoryStore, StorageError, StorageResult};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;

    use super::super::filter::Predicate;

    /// Store whose reads never complete
    struct StalledStore;

    #[async_trait]
    impl EventStore for StalledStore {
        async fn init(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn insert(&self, _record: &EventRecord) -> StorageResult<()> {
            Ok(())
        }

        async fn query(
            &self,
            _domain_id: &DomainId,
            _predicate: &Predicate,
        ) -> StorageResult<Vec<EventRecord>> {
            std::future::pending().await
        }

        async fn first_seen(
            &self,
            _domain_id: &DomainId,
            _fields: &[Field],
        ) -> StorageResult<Vec<FirstSeen>> {
            std::future::pending().await
        }

        async fn has_records(&self, _domain_id: &DomainId) -> StorageResult<bool> {
            std::future::pending().await
        }
    }

    /// Store that is always down
    struct BrokenStore;

    #[async_trait]
    impl EventStore for BrokenStore {
        async fn init(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn insert(&self, _record: &EventRecord) -> StorageResult<()> {
            Err(StorageError::Other(anyhow::anyhow!("connection refused")))
        }

        async fn query(
            &self,
            _domain_id: &DomainId,
            _predicate: &Predicate,
        ) -> StorageResult<Vec<EventRecord>> {
            Err(StorageError::Other(anyhow::anyhow!("connection refused")))
        }

        async fn first_seen(
            &self,
            _domain_id: &DomainId,
            _fields: &[Field],
        ) -> StorageResult<Vec<FirstSeen>> {
            Err(StorageError::Other(anyhow::anyhow!("connection refused")))
        }

        async fn has_records(&self, _domain_id: &DomainId) -> StorageResult<bool> {
            Err(StorageError::Other(anyhow::anyhow!("connection refused")))
        }
    }

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
    }

    fn aggregator(store: Arc<dyn EventStore>, ttl: Duration) -> Aggregator {
        let config = AggregationConfig {
            ttl,
            ..AggregationConfig::default()
        };
        Aggregator::new(store, Arc::new(FixedClock(reference())), config)
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_a_stalled_store() {
        let aggregator = aggregator(Arc::new(StalledStore), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = aggregator
            .top_records(&DomainId::random(), &[Field::OsName], Range::Last7Days, None, reference(), &cancel)
            .await;
        assert!(matches!(result, Err(AggregationError::Canceled)));
    }

    #[tokio::test]
    async fn test_deadline_cancels_the_call() {
        let aggregator = aggregator(Arc::new(StalledStore), Duration::from_millis(20));
        let result = aggregator
            .active_visitors(&DomainId::random(), reference(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AggregationError::Canceled)));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let aggregator = aggregator(Arc::new(BrokenStore), Duration::from_secs(5));
        let result = aggregator
            .recent_records(&DomainId::random(), &[Field::OsName], &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AggregationError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_invalid_arguments_fail_fast() {
        let aggregator = aggregator(Arc::new(BrokenStore), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let domain = DomainId::random();

        let result = aggregator.new_records(&domain, &[], &cancel).await;
        assert!(matches!(result, Err(AggregationError::InvalidArgument(_))));

        let result = aggregator
            .durations(&domain, Interval::Daily, 0, reference(), &cancel)
            .await;
        assert!(matches!(result, Err(AggregationError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_clock_is_injected() {
        let aggregator = aggregator(Arc::new(MemoryStore::new()), Duration::from_secs(5));
        assert_eq!(aggregator.now(), reference());
    }
}
