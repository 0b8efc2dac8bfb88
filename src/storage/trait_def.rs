use crate::analytics::{FirstSeen, Predicate};
use crate::models::{DomainId, EventRecord, Field, InvalidRecord};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Invalid(#[from] InvalidRecord),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read side of the event log, plus the single write the ingestion path needs.
///
/// Implementations return records in no particular order; the aggregations
/// impose their own.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> StorageResult<()>;

    /// Persist one record. Fails with `Invalid` when [`EventRecord::validate`]
    /// rejects it and with `Conflict` when its id is taken.
    async fn insert(&self, record: &EventRecord) -> StorageResult<()>;

    /// Records of `domain_id` matching `predicate`
    async fn query(
        &self,
        domain_id: &DomainId,
        predicate: &Predicate,
    ) -> StorageResult<Vec<EventRecord>>;

    /// First occurrence of every distinct key of `fields` in the domain's
    /// history. Must agree with [`crate::analytics::novelty::first_seen`]
    /// over the full history.
    async fn first_seen(
        &self,
        domain_id: &DomainId,
        fields: &[Field],
    ) -> StorageResult<Vec<FirstSeen>>;

    /// Whether the domain has recorded anything at all
    async fn has_records(&self, domain_id: &DomainId) -> StorageResult<bool>;
}
