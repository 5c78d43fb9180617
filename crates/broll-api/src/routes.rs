//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{get_task_status, get_video, health, submit_merge};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, hide_internal_errors, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    // Submission probes remote hosts, so it is the only rate-limited route
    let intake_routes = Router::new()
        .route("/tasks/merge-broll", post(submit_merge))
        .route("/tasks/merge", post(submit_merge))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let task_routes = Router::new()
        .route("/tasks/:task_id", get(get_task_status))
        .route("/video/:filename", get(get_video));

    let health_routes = Router::new().route("/health", get(health));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let mut app = Router::new()
        .merge(intake_routes)
        .merge(task_routes)
        .merge(health_routes)
        .merge(metrics_routes);

    if state.config.is_production() {
        app = app.layer(middleware::from_fn(hide_internal_errors));
    }

    app.layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
