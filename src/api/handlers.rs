//! REST API handlers.

use crate::error::{ApiError, ErrorResponse};
use crate::filters::{FilterChain, RawFilterConfig};
use crate::metrics::Gauge;
use crate::models::{
    BatchScanResponse, CacheInvalidationResponse, FilterValidationResponse, FiltersRequest,
    FiltersResponse, HealthResponse, PresetsResponse, ScanQuery, ScanRequest, StatisticsResponse,
    SymbolScanResponse,
};
use crate::presets::{FilterPreset, PresetInput, PresetUpdate};
use crate::rate_limiter::Priority;
use crate::scanner::{ScanResult, normalize_symbol};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};


/// Largest accepted batch.
pub const MAX_BATCH_SYMBOLS: usize = 100;

/// Content type of the Prometheus text format.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// ============================================================================
// Health Check
// ============================================================================

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: state.coordinator.provider_name().to_string(),
        cache_entries: state.coordinator.cache().len(),
        in_flight: state.coordinator.in_flight(),
    })
}

// ============================================================================
// Scans
// ============================================================================

/// Scan a single symbol.
///
/// Uses the default filters unless `filters` carries a JSON filter list.
#[utoipa::path(
    get,
    path = "/scan/{symbol}",
    params(
        ("symbol" = String, Path, description = "Underlying symbol"),
        ScanQuery
    ),
    responses(
        (status = 200, description = "Scan result", body = ScanResult),
        (status = 400, description = "Invalid symbol or filters", body = ErrorResponse),
        (status = 404, description = "Unknown symbol", body = ErrorResponse),
        (status = 502, description = "Upstream failure", body = ErrorResponse),
        (status = 504, description = "Scan timed out", body = ErrorResponse)
    ),
    tag = "Scans"
)]
pub async fn scan_symbol(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<ScanQuery>,
) -> Result<Json<ScanResult>, ApiError> {
    let filters = match query.filters.as_deref() {
        Some(raw) => serde_json::from_str::<Vec<RawFilterConfig>>(raw)
            .map_err(|e| ApiError::InvalidRequest(format!("filters: {}", e)))?,
        None => state.default_filters(),
    };
    let strategy = query.strategy.or(state.config.scanner.default_strategy);

    let plan = state.coordinator.plan(&filters, strategy, query.limit)?;
    let result = state
        .coordinator
        .scan_symbol(&symbol, &plan, Priority::High)
        .await?;

    debug!(
        "Scan of {} returned {} rows",
        result.symbol, result.result_count
    );
    Ok(Json(result.as_ref().clone()))
}

/// Scan several symbols.
///
/// Each symbol succeeds or fails on its own; results keep request order.
#[utoipa::path(
    post,
    path = "/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Per-symbol results", body = BatchScanResponse),
        (status = 400, description = "Invalid request or filters", body = ErrorResponse)
    ),
    tag = "Scans"
)]
pub async fn scan_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<BatchScanResponse>, ApiError> {
    if request.symbols.is_empty() {
        return Err(ApiError::InvalidRequest(
            "symbols must not be empty".to_string(),
        ));
    }
    if request.symbols.len() > MAX_BATCH_SYMBOLS {
        return Err(ApiError::InvalidRequest(format!(
            "at most {} symbols per request",
            MAX_BATCH_SYMBOLS
        )));
    }

    let filters = request
        .filters
        .unwrap_or_else(|| state.default_filters());
    let strategy = request.strategy.or(state.config.scanner.default_strategy);
    let plan = state
        .coordinator
        .plan(&filters, strategy, request.max_results)?;

    let started = Instant::now();
    let scans = state
        .coordinator
        .scan_many(&request.symbols, &plan, Priority::Normal)
        .await;

    let results: Vec<SymbolScanResponse> = scans
        .into_iter()
        .map(|scan| match scan.result {
            Ok(result) => SymbolScanResponse {
                symbol: scan.symbol,
                result: Some(result.as_ref().clone()),
                error: None,
            },
            Err(e) => SymbolScanResponse {
                symbol: scan.symbol,
                result: None,
                error: Some(ApiError::from(e).to_body()),
            },
        })
        .collect();
    let succeeded = results.iter().filter(|r| r.result.is_some()).count();
    let failed = results.len() - succeeded;

    info!(
        "Batch scan of {} symbols: {} succeeded, {} failed",
        results.len(),
        succeeded,
        failed
    );

    Ok(Json(BatchScanResponse {
        results,
        succeeded,
        failed,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }))
}

// ============================================================================
// Filters
// ============================================================================

/// Get the default filter configuration.
#[utoipa::path(
    get,
    path = "/filters",
    responses(
        (status = 200, description = "Default filters", body = FiltersResponse)
    ),
    tag = "Filters"
)]
pub async fn get_filters(State(state): State<Arc<AppState>>) -> Json<FiltersResponse> {
    let filters = state.default_filters();
    Json(FiltersResponse {
        count: filters.len(),
        filters,
    })
}

/// Replace the default filter configuration.
///
/// The new chain is validated before it is stored.
#[utoipa::path(
    put,
    path = "/filters",
    request_body = FiltersRequest,
    responses(
        (status = 200, description = "Filters updated", body = FiltersResponse),
        (status = 400, description = "Invalid filters", body = ErrorResponse)
    ),
    tag = "Filters"
)]
pub async fn update_filters(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FiltersRequest>,
) -> Result<Json<FiltersResponse>, ApiError> {
    FilterChain::from_raw(&request.filters)?;
    *state.default_filters.write() = request.filters.clone();
    info!("Default filters updated ({} filters)", request.filters.len());

    Ok(Json(FiltersResponse {
        count: request.filters.len(),
        filters: request.filters,
    }))
}

/// Validate a filter configuration without storing it.
#[utoipa::path(
    post,
    path = "/api/v1/filters/validate",
    request_body = FiltersRequest,
    responses(
        (status = 200, description = "Validation outcome", body = FilterValidationResponse)
    ),
    tag = "Filters"
)]
pub async fn validate_filters(Json(request): Json<FiltersRequest>) -> Json<FilterValidationResponse> {
    let response = match FilterChain::from_raw(&request.filters) {
        Ok(chain) => FilterValidationResponse {
            valid: true,
            filters: chain
                .filters()
                .iter()
                .filter_map(|f| serde_json::to_value(f).ok())
                .collect(),
            error: None,
        },
        Err(e) => FilterValidationResponse {
            valid: false,
            filters: Vec::new(),
            error: Some(e.to_string()),
        },
    };
    Json(response)
}

// ============================================================================
// Filter Presets
// ============================================================================

/// List filter presets.
#[utoipa::path(
    get,
    path = "/api/v1/filters/presets",
    responses(
        (status = 200, description = "Presets sorted by name", body = PresetsResponse)
    ),
    tag = "Filters"
)]
pub async fn list_presets(State(state): State<Arc<AppState>>) -> Json<PresetsResponse> {
    let presets = state.presets.list();
    Json(PresetsResponse {
        count: presets.len(),
        presets,
    })
}

/// Create a filter preset.
#[utoipa::path(
    post,
    path = "/api/v1/filters/presets",
    request_body = PresetInput,
    responses(
        (status = 201, description = "Preset created", body = FilterPreset),
        (status = 400, description = "Missing name or invalid filters", body = ErrorResponse)
    ),
    tag = "Filters"
)]
pub async fn create_preset(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PresetInput>,
) -> Result<(StatusCode, Json<FilterPreset>), ApiError> {
    let preset = state.presets.create(input)?;
    Ok((StatusCode::CREATED, Json(preset)))
}

/// Get a filter preset.
#[utoipa::path(
    get,
    path = "/api/v1/filters/presets/{id}",
    params(
        ("id" = String, Path, description = "Preset id")
    ),
    responses(
        (status = 200, description = "Preset", body = FilterPreset),
        (status = 404, description = "Unknown preset", body = ErrorResponse)
    ),
    tag = "Filters"
)]
pub async fn get_preset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FilterPreset>, ApiError> {
    Ok(Json(state.presets.get(&id)?))
}

/// Modify a filter preset. Absent fields are left unchanged.
#[utoipa::path(
    put,
    path = "/api/v1/filters/presets/{id}",
    params(
        ("id" = String, Path, description = "Preset id")
    ),
    request_body = PresetUpdate,
    responses(
        (status = 200, description = "Preset updated", body = FilterPreset),
        (status = 400, description = "Blank name or invalid filters", body = ErrorResponse),
        (status = 404, description = "Unknown preset", body = ErrorResponse)
    ),
    tag = "Filters"
)]
pub async fn update_preset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<PresetUpdate>,
) -> Result<Json<FilterPreset>, ApiError> {
    Ok(Json(state.presets.update(&id, update)?))
}

/// Delete a filter preset.
#[utoipa::path(
    delete,
    path = "/api/v1/filters/presets/{id}",
    params(
        ("id" = String, Path, description = "Preset id")
    ),
    responses(
        (status = 204, description = "Preset deleted"),
        (status = 404, description = "Unknown preset", body = ErrorResponse)
    ),
    tag = "Filters"
)]
pub async fn delete_preset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.presets.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Cache
// ============================================================================

/// Drop every cached scan result.
#[utoipa::path(
    delete,
    path = "/api/v1/cache",
    responses(
        (status = 200, description = "Cache cleared", body = CacheInvalidationResponse)
    ),
    tag = "Cache"
)]
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<CacheInvalidationResponse> {
    Json(CacheInvalidationResponse {
        symbol: None,
        removed: state.coordinator.clear_cache(),
    })
}

/// Drop cached scan results for one symbol.
#[utoipa::path(
    delete,
    path = "/api/v1/cache/{symbol}",
    params(
        ("symbol" = String, Path, description = "Underlying symbol")
    ),
    responses(
        (status = 200, description = "Entries removed", body = CacheInvalidationResponse),
        (status = 400, description = "Invalid symbol", body = ErrorResponse)
    ),
    tag = "Cache"
)]
pub async fn invalidate_symbol(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<CacheInvalidationResponse>, ApiError> {
    let symbol = normalize_symbol(&symbol)?;
    let removed = state.coordinator.invalidate_symbol(&symbol);
    Ok(Json(CacheInvalidationResponse {
        symbol: Some(symbol),
        removed,
    }))
}

// ============================================================================
// Statistics and Metrics
// ============================================================================

/// Aggregate scanner statistics.
#[utoipa::path(
    get,
    path = "/analytics/statistics",
    responses(
        (status = 200, description = "Aggregate statistics", body = StatisticsResponse)
    ),
    tag = "Statistics"
)]
pub async fn get_statistics(State(state): State<Arc<AppState>>) -> Json<StatisticsResponse> {
    let limiter = state.coordinator.limiter().stats();
    Json(StatisticsResponse::from_snapshot(
        state.metrics.snapshot(),
        state.coordinator.cache().len(),
        limiter.available,
        limiter.waiting,
        state.streamer.subscribed_symbols().len(),
    ))
}

/// Prometheus text exposition.
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Metrics in Prometheus text format", body = String, content_type = "text/plain")
    ),
    tag = "Statistics"
)]
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let limiter = state.coordinator.limiter().stats();
    let gauges = [
        Gauge {
            name: "scanner_cache_entries",
            help: "Cached scan results",
            value: state.coordinator.cache().len() as f64,
        },
        Gauge {
            name: "scanner_in_flight_scans",
            help: "Scans currently fetching upstream",
            value: state.coordinator.in_flight() as f64,
        },
        Gauge {
            name: "scanner_rate_limiter_tokens",
            help: "Upstream rate limiter tokens available",
            value: limiter.available,
        },
        Gauge {
            name: "scanner_rate_limiter_waiting",
            help: "Callers waiting for an upstream token",
            value: limiter.waiting as f64,
        },
        Gauge {
            name: "scanner_stream_symbols",
            help: "Symbols with live stream subscribers",
            value: state.streamer.subscribed_symbols().len() as f64,
        },
        Gauge {
            name: "scanner_stream_profiles",
            help: "Distinct filter profiles with live stream subscribers",
            value: state.streamer.active_profiles() as f64,
        },
        Gauge {
            name: "scanner_memoized_chains",
            help: "Filter chains held for reuse",
            value: state.coordinator.memoized_chains() as f64,
        },
        Gauge {
            name: "scanner_filter_presets",
            help: "Stored filter presets",
            value: state.presets.len() as f64,
        },
    ];

    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render_prometheus(&gauges),
    )
}
