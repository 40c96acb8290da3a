//! Error types for the REST API.

use crate::filters::FilterError;
use crate::presets::PresetError;
use crate::provider::FetchError;
use crate::scanner::ScanError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;


/// API error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Error code.
    pub code: String,
}

/// API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request body or parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Filter configuration rejected.
    #[error("Invalid filter configuration: {0}")]
    InvalidFilter(#[from] FilterError),

    /// Symbol not known to the market-data provider.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// No preset has the requested id.
    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    /// Upstream provider failed after retries.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Scan exceeded its deadline.
    #[error("Scan timed out: {0}")]
    Timeout(String),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status and machine-readable code.
    #[must_use]
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::InvalidFilter(_) => (StatusCode::BAD_REQUEST, "INVALID_FILTER"),
            ApiError::SymbolNotFound(_) => (StatusCode::NOT_FOUND, "SYMBOL_NOT_FOUND"),
            ApiError::PresetNotFound(_) => (StatusCode::NOT_FOUND, "PRESET_NOT_FOUND"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "SCAN_TIMEOUT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Body sent to the client.
    #[must_use]
    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.status_and_code().1.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_code();
        (status, Json(self.to_body())).into_response()
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Config(e) => ApiError::InvalidFilter(e),
            ScanError::InvalidSymbol(_) => ApiError::InvalidRequest(err.to_string()),
            ScanError::Upstream {
                symbol,
                source: FetchError::UnknownSymbol(_),
            } => ApiError::SymbolNotFound(symbol),
            ScanError::Upstream { .. } => ApiError::Upstream(err.to_string()),
            ScanError::Timeout { .. } => ApiError::Timeout(err.to_string()),
            ScanError::Aborted(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<PresetError> for ApiError {
    fn from(err: PresetError) -> Self {
        match err {
            PresetError::NotFound(id) => ApiError::PresetNotFound(id),
            PresetError::MissingName => ApiError::InvalidRequest(err.to_string()),
            PresetError::InvalidFilters(e) => ApiError::InvalidFilter(e),
        }
    }
}
