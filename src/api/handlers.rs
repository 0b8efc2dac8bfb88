use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::analytics::{AggregationError, Aggregator};

pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    /// Parent of every request's cancellation token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// `at` from the query string, or the aggregator clock's current instant
    pub fn reference(&self, at: Option<&str>) -> Result<DateTime<Utc>, AggregationError> {
        match at {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|instant| instant.with_timezone(&Utc))
                .map_err(|_| AggregationError::invalid(format!("'{raw}' is not an RFC 3339 instant"))),
            None => Ok(self.aggregator.now()),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

impl IntoResponse for AggregationError {
    fn into_response(self) -> Response {
        let status = match &self {
            AggregationError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AggregationError::Canceled => StatusCode::SERVICE_UNAVAILABLE,
            AggregationError::StoreUnavailable(e) => {
                tracing::error!("Event store failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
