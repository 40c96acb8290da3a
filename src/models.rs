//! Request and response models for the REST API.

use crate::error::ErrorResponse;
use crate::filters::RawFilterConfig;
use crate::metrics::{FilterStatistics, StatisticsSnapshot};
use crate::presets::FilterPreset;
use crate::scanner::{ScanResult, SpreadStrategy};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Market-data provider name.
    pub provider: String,
    /// Cached scan results.
    pub cache_entries: usize,
    /// Scans currently being fetched.
    pub in_flight: usize,
}

/// Query parameters for a single-symbol scan.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ScanQuery {
    /// JSON-encoded filter list; the default filters apply when absent.
    pub filters: Option<String>,
    /// Spread strategy; omit for options only.
    pub strategy: Option<SpreadStrategy>,
    /// Maximum rows returned.
    #[serde(alias = "maxResults", alias = "max_results")]
    pub limit: Option<usize>,
}

/// Batch scan request.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ScanRequest {
    /// Symbols to scan.
    pub symbols: Vec<String>,
    /// Filter chain; the default filters apply when absent.
    #[serde(default)]
    pub filters: Option<Vec<RawFilterConfig>>,
    /// Maximum rows returned per symbol.
    #[serde(default, alias = "maxResults")]
    pub max_results: Option<usize>,
    /// Spread strategy; omit for options only.
    #[serde(default)]
    pub strategy: Option<SpreadStrategy>,
}

/// Outcome of one symbol inside a batch.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SymbolScanResponse {
    /// Normalised symbol.
    pub symbol: String,
    /// Scan result when the symbol succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    /// Error when the symbol failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// Batch scan response, in request order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchScanResponse {
    /// Per-symbol outcomes.
    pub results: Vec<SymbolScanResponse>,
    /// Symbols that succeeded.
    pub succeeded: usize,
    /// Symbols that failed.
    pub failed: usize,
    /// Wall-clock time of the batch in milliseconds.
    pub elapsed_ms: u64,
}

/// Default filter configuration.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FiltersResponse {
    /// Filters in evaluation order.
    pub filters: Vec<RawFilterConfig>,
    /// Number of filters.
    pub count: usize,
}

/// Request body replacing or validating a filter configuration.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FiltersRequest {
    /// Filters in evaluation order.
    pub filters: Vec<RawFilterConfig>,
}

/// Filter presets listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PresetsResponse {
    /// Presets sorted by name.
    pub presets: Vec<FilterPreset>,
    /// Number of presets.
    pub count: usize,
}

/// Result of validating a filter configuration.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FilterValidationResponse {
    /// Whether the chain builds.
    pub valid: bool,
    /// Normalised filters with defaults filled in.
    #[schema(value_type = Vec<Object>)]
    pub filters: Vec<serde_json::Value>,
    /// Build error, when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cache invalidation result.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheInvalidationResponse {
    /// Symbol targeted, or none for a full clear.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Entries removed.
    pub removed: usize,
}

/// Per-filter statistics.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FilterStatisticsResponse {
    /// Filter kind.
    pub kind: String,
    /// Contracts evaluated.
    pub evaluated: u64,
    /// Contracts passed.
    pub passed: u64,
    /// Pass rate in `[0, 1]`.
    pub pass_rate: f64,
}

impl From<FilterStatistics> for FilterStatisticsResponse {
    fn from(stat: FilterStatistics) -> Self {
        Self {
            kind: stat.kind,
            evaluated: stat.evaluated,
            passed: stat.passed,
            pass_rate: stat.pass_rate,
        }
    }
}

/// Aggregate scanner statistics.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatisticsResponse {
    /// Scans of any outcome.
    pub total_scans: u64,
    /// Successful scans.
    pub successful_scans: u64,
    /// Failed scans.
    pub failed_scans: u64,
    /// Scans that timed out.
    pub timed_out_scans: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// Cache hit ratio in `[0, 1]`.
    pub cache_hit_ratio: f64,
    /// Cached results currently held.
    pub cache_entries: usize,
    /// Upstream fetch attempts.
    pub upstream_fetches: u64,
    /// Failed upstream fetch attempts.
    pub upstream_failures: u64,
    /// Contracts fed into filter chains.
    pub contracts_evaluated: u64,
    /// Contracts that survived filter chains.
    pub contracts_passed: u64,
    /// Mean fraction of contracts removed by filtering.
    pub average_filter_reduction: f64,
    /// Mean scan latency in milliseconds.
    pub average_scan_ms: f64,
    /// Spread candidates produced.
    pub spreads_found: u64,
    /// Rate limiter tokens currently available.
    pub rate_limit_tokens: f64,
    /// Callers waiting on the rate limiter.
    pub rate_limit_waiting: usize,
    /// Symbols with live subscribers.
    pub streaming_symbols: usize,
    /// Per-filter pass rates.
    pub filters: Vec<FilterStatisticsResponse>,
    /// Seconds since start.
    pub uptime_secs: u64,
}

impl StatisticsResponse {
    /// Builds the response from a registry snapshot and live gauges.
    #[must_use]
    pub fn from_snapshot(
        snapshot: StatisticsSnapshot,
        cache_entries: usize,
        rate_limit_tokens: f64,
        rate_limit_waiting: usize,
        streaming_symbols: usize,
    ) -> Self {
        Self {
            total_scans: snapshot.total_scans,
            successful_scans: snapshot.successful_scans,
            failed_scans: snapshot.failed_scans,
            timed_out_scans: snapshot.timed_out_scans,
            cache_hits: snapshot.cache_hits,
            cache_misses: snapshot.cache_misses,
            cache_hit_ratio: snapshot.cache_hit_ratio,
            cache_entries,
            upstream_fetches: snapshot.upstream_fetches,
            upstream_failures: snapshot.upstream_failures,
            contracts_evaluated: snapshot.contracts_evaluated,
            contracts_passed: snapshot.contracts_passed,
            average_filter_reduction: snapshot.average_filter_reduction,
            average_scan_ms: snapshot.average_scan_ms,
            spreads_found: snapshot.spreads_found,
            rate_limit_tokens,
            rate_limit_waiting,
            streaming_symbols,
            filters: snapshot.filters.into_iter().map(Into::into).collect(),
            uptime_secs: snapshot.uptime_secs,
        }
    }
}
