//! Aggregation engine
//!
//! Pure components (windowing, filtering, ranking, duration bucketing,
//! active session counting, novelty classification) composed by the
//! [`Aggregator`] on top of an [`EventStore`](crate::storage::EventStore).

pub mod active;
pub mod aggregator;
pub mod durations;
pub mod error;
pub mod filter;
pub mod models;
pub mod novelty;
pub mod ranker;
pub mod recent;
pub mod window;

pub use aggregator::Aggregator;
pub use error::{AggregationError, AggregationResult};
pub use filter::{Predicate, TimeField, TimeRange};
pub use models::{
    ActiveVisitors, Classification, DurationPoint, FieldCount, FirstSeen, RankKey, RankedEntry,
    RecentValue,
};
pub use window::{buckets_for, Interval, Range, TimeBucket, MAX_BUCKETS};
