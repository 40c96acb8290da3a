//! API middleware.

use crate::metrics::{MetricsSink, method_label};
use crate::state::AppState;
use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use std::sync::Arc;
use tracing::debug;

/// Counts every request by method and response status.
///
/// Extension methods are folded into one `OTHER` label value.
pub async fn request_metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = method_label(request.method().as_str());
    let response = next.run(request).await;
    let status = response.status().as_u16();

    if let Err(e) = state.metrics.record_http_request(method, status) {
        debug!("Dropping HTTP request metric: {}", e);
    }

    response
}
