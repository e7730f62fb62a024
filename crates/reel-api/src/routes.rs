//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    cancel_generation, get_generation, get_merge, health, list_generations, list_merges,
    localize_results, ready, submit_generation, submit_merge,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let generation_routes = Router::new()
        .route("/generations", post(submit_generation).get(list_generations))
        .route("/generations/localize", post(localize_results))
        .route("/generations/:id", get(get_generation))
        .route("/generations/:id/cancel", post(cancel_generation));

    let merge_routes = Router::new()
        .route("/merges", post(submit_merge).get(list_merges))
        .route("/merges/:id", get(get_merge));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let static_files = ServeDir::new(state.storage.root());

    Router::new()
        .nest("/api", generation_routes.merge(merge_routes))
        .merge(health_routes)
        .merge(metrics_routes)
        .nest_service("/static", static_files)
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
