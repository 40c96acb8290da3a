//! Route configuration.

use crate::api::{handlers, middleware, websocket};
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post};
use std::sync::Arc;

/// Creates the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // WebSocket
        .route("/ws", get(websocket::ws_handler))
        // Scans
        .route("/scan", post(handlers::scan_batch))
        .route("/scan/{symbol}", get(handlers::scan_symbol))
        // Filters
        .route(
            "/filters",
            get(handlers::get_filters).put(handlers::update_filters),
        )
        .route("/api/v1/filters/validate", post(handlers::validate_filters))
        .route(
            "/api/v1/filters/presets",
            get(handlers::list_presets).post(handlers::create_preset),
        )
        .route(
            "/api/v1/filters/presets/{id}",
            get(handlers::get_preset)
                .put(handlers::update_preset)
                .delete(handlers::delete_preset),
        )
        // Cache
        .route("/api/v1/cache", delete(handlers::clear_cache))
        .route("/api/v1/cache/{symbol}", delete(handlers::invalidate_symbol))
        // Statistics
        .route("/analytics/statistics", get(handlers::get_statistics))
        .route("/metrics", get(handlers::get_metrics))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::request_metrics_middleware,
        ))
        .with_state(state)
}
