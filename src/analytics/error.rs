use thiserror::Error;

use crate::models::{MalformedDomainId, UnknownField};
use crate::storage::StorageError;

/// Failure kinds of an aggregation call. A domain without records is not
/// an error: aggregations return an empty sequence for it.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("event store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    #[error("aggregation canceled")]
    Canceled,
}

pub type AggregationResult<T> = Result<T, AggregationError>;

impl AggregationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<UnknownField> for AggregationError {
    fn from(err: UnknownField) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<MalformedDomainId> for AggregationError {
    fn from(err: MalformedDomainId) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}
