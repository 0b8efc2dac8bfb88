use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::analytics::Aggregator;
use crate::config::CorsConfig;

use super::analytics::{
    active_visitors, durations, new_counts, new_records, recent_records, top_records,
};
use super::handlers::{health_check, AppState};

pub fn create_api_router(
    aggregator: Arc<Aggregator>,
    cors: &CorsConfig,
    shutdown: CancellationToken,
) -> Router {
    let state = Arc::new(AppState {
        aggregator,
        shutdown,
    });

    let analytics_routes = Router::new()
        .route("/domains/{domain_id}/active-visitors", get(active_visitors))
        .route("/domains/{domain_id}/durations", get(durations))
        .route("/domains/{domain_id}/new-records", get(new_records))
        .route("/domains/{domain_id}/new-counts", get(new_counts))
        .route("/domains/{domain_id}/recent-records", get(recent_records))
        .route("/domains/{domain_id}/top-records", get(top_records))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", analytics_routes)
        .layer(cors_layer(cors))
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);

    if cors.auto_origin {
        return layer.allow_origin(AllowOrigin::mirror_request());
    }

    let origins: Vec<HeaderValue> = cors
        .allow_origin
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        layer
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
