//! Analytics API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::handlers::AppState;
use crate::analytics::{
    ActiveVisitors, AggregationError, DurationPoint, FieldCount, FirstSeen, Interval, Range,
    RankedEntry, RecentValue,
};
use crate::models::{DomainId, Field};

/// Upper bound for a caller-supplied rank limit
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct AtParams {
    /// RFC 3339 reference instant (default: now)
    pub at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DurationsParams {
    pub interval: Option<String>,

    /// Number of buckets (default: 14)
    #[serde(default = "default_bucket_count")]
    pub count: usize,

    pub at: Option<String>,
}

fn default_bucket_count() -> usize {
    14
}

#[derive(Debug, Deserialize)]
pub struct FieldsParams {
    /// Comma-separated field names
    pub fields: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub fields: Option<String>,
    pub range: Option<String>,
    pub limit: Option<usize>,
    pub at: Option<String>,
}

fn parse_fields(raw: Option<&str>) -> Result<Vec<Field>, AggregationError> {
    let fields = Field::parse_list(raw.unwrap_or_default())?;
    if fields.is_empty() {
        return Err(AggregationError::invalid("query parameter 'fields' is required"));
    }
    Ok(fields)
}

fn parse_range(raw: Option<&str>) -> Result<Range, AggregationError> {
    raw.map(str::parse::<Range>).transpose().map(Option::unwrap_or_default)
}

/// Count distinct active sessions
pub async fn active_visitors(
    State(state): State<Arc<AppState>>,
    Path(domain_id): Path<String>,
    Query(params): Query<AtParams>,
) -> Result<Json<Vec<ActiveVisitors>>, AggregationError> {
    let domain_id = domain_id.parse::<DomainId>()?;
    let at = state.reference(params.at.as_deref())?;
    let cancel = state.shutdown.child_token();

    let active = state
        .aggregator
        .active_visitors(&domain_id, at, &cancel)
        .await?;
    Ok(Json(active))
}

/// Average visit duration per bucket
pub async fn durations(
    State(state): State<Arc<AppState>>,
    Path(domain_id): Path<String>,
    Query(params): Query<DurationsParams>,
) -> Result<Json<Vec<DurationPoint>>, AggregationError> {
    let domain_id = domain_id.parse::<DomainId>()?;
    let interval = params
        .interval
        .as_deref()
        .map(str::parse::<Interval>)
        .transpose()?
        .unwrap_or(Interval::Daily);
    let at = state.reference(params.at.as_deref())?;
    let cancel = state.shutdown.child_token();

    let points = state
        .aggregator
        .durations(&domain_id, interval, params.count, at, &cancel)
        .await?;
    Ok(Json(points))
}

/// Newest first-seen values
pub async fn new_records(
    State(state): State<Arc<AppState>>,
    Path(domain_id): Path<String>,
    Query(params): Query<FieldsParams>,
) -> Result<Json<Vec<FirstSeen>>, AggregationError> {
    let domain_id = domain_id.parse::<DomainId>()?;
    let fields = parse_fields(params.fields.as_deref())?;
    let cancel = state.shutdown.child_token();

    let markers = state
        .aggregator
        .new_records(&domain_id, &fields, &cancel)
        .await?;
    Ok(Json(markers))
}

/// Count of values first seen inside a range, per field
pub async fn new_counts(
    State(state): State<Arc<AppState>>,
    Path(domain_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<FieldCount>>, AggregationError> {
    let domain_id = domain_id.parse::<DomainId>()?;
    let fields = parse_fields(params.fields.as_deref())?;
    let range = parse_range(params.range.as_deref())?;
    let at = state.reference(params.at.as_deref())?;
    let cancel = state.shutdown.child_token();

    let counts = state
        .aggregator
        .new_value_counts(&domain_id, &fields, range, at, &cancel)
        .await?;
    Ok(Json(counts))
}

/// Latest distinct values
pub async fn recent_records(
    State(state): State<Arc<AppState>>,
    Path(domain_id): Path<String>,
    Query(params): Query<FieldsParams>,
) -> Result<Json<Vec<RecentValue>>, AggregationError> {
    let domain_id = domain_id.parse::<DomainId>()?;
    let fields = parse_fields(params.fields.as_deref())?;
    let cancel = state.shutdown.child_token();

    let values = state
        .aggregator
        .recent_records(&domain_id, &fields, &cancel)
        .await?;
    Ok(Json(values))
}

/// Most frequent values inside a range
pub async fn top_records(
    State(state): State<Arc<AppState>>,
    Path(domain_id): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<RankedEntry>>, AggregationError> {
    let domain_id = domain_id.parse::<DomainId>()?;
    let fields = parse_fields(params.fields.as_deref())?;
    let range = parse_range(params.range.as_deref())?;
    let limit = params.limit.map(|limit| limit.min(MAX_LIMIT));
    let at = state.reference(params.at.as_deref())?;
    let cancel = state.shutdown.child_token();

    let entries = state
        .aggregator
        .top_records(&domain_id, &fields, range, limit, at, &cancel)
        .await?;
    Ok(Json(entries))
}
