//! Request and response types for the scanner API.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[cfg(test)]
mod tests;

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Call option.
    Call,
    /// Put option.
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// Vertical spread flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadStrategy {
    /// Pay to open.
    Debit,
    /// Collect to open.
    Credit,
}

impl std::fmt::Display for SpreadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debit => write!(f, "debit"),
            Self::Credit => write!(f, "credit"),
        }
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// Error body returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error message.
    pub error: String,
    /// Error code.
    pub code: String,
}

// ============================================================================
// Filters
// ============================================================================

/// One filter of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filter kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Kind-specific parameters.
    #[serde(default)]
    pub params: Value,
}

impl FilterConfig {
    /// Creates a filter from a kind and raw parameters.
    #[must_use]
    pub fn new(kind: &str, params: Value) -> Self {
        Self {
            kind: kind.to_string(),
            params,
        }
    }

    /// `|delta|` within `[min, max]`.
    #[must_use]
    pub fn delta(min: f64, max: f64) -> Self {
        Self::new("delta", json!({ "min": min, "max": max }))
    }

    /// Days to expiration within `[min, max]`.
    #[must_use]
    pub fn dte(min: u32, max: u32) -> Self {
        Self::new("dte", json!({ "min": min, "max": max }))
    }

    /// Minimum volume.
    #[must_use]
    pub fn volume(min: u64) -> Self {
        Self::new("volume", json!({ "min": min }))
    }

    /// Minimum open interest.
    #[must_use]
    pub fn open_interest(min: u64) -> Self {
        Self::new("open_interest", json!({ "min": min }))
    }

    /// IV percentile within `[min, max]`.
    #[must_use]
    pub fn iv_percentile(min: f64, max: f64) -> Self {
        Self::new("iv_percentile", json!({ "min": min, "max": max }))
    }

    /// Maximum bid-ask spread as a fraction of mid.
    #[must_use]
    pub fn bid_ask_spread(max: f64) -> Self {
        Self::new("bid_ask_spread", json!({ "max": max }))
    }

    /// Only the given option types.
    #[must_use]
    pub fn option_type(types: &[OptionType]) -> Self {
        Self::new("option_type", json!({ "types": types }))
    }

    /// Minimum liquidity score.
    #[must_use]
    pub fn liquidity(min: f64) -> Self {
        Self::new("liquidity", json!({ "min": min }))
    }

    /// Theta within `[min, max]`.
    #[must_use]
    pub fn theta(min: f64, max: f64) -> Self {
        Self::new("theta", json!({ "min": min, "max": max }))
    }

    /// Vega within `[min, max]`.
    #[must_use]
    pub fn vega(min: f64, max: f64) -> Self {
        Self::new("vega", json!({ "min": min, "max": max }))
    }

    /// Implied volatility within `[min, max]`.
    #[must_use]
    pub fn iv(min: f64, max: f64) -> Self {
        Self::new("iv", json!({ "min": min, "max": max }))
    }

    /// Spread probability of profit within `[min, max]`.
    #[must_use]
    pub fn pop(min: f64, max: f64) -> Self {
        Self::new("pop", json!({ "min": min, "max": max }))
    }

    /// Spread strike width within `[min, max]`.
    #[must_use]
    pub fn spread_width(min: f64, max: f64) -> Self {
        Self::new("spread_width", json!({ "min": min, "max": max }))
    }
}

/// A stored filter preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPreset {
    /// Preset id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Filters in evaluation order.
    pub filters: Vec<FilterConfig>,
    /// Labels.
    pub tags: Vec<String>,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last modification time (RFC 3339).
    pub updated_at: String,
    /// Times fetched by id.
    pub usage_count: u64,
}

/// Request body creating a preset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetRequest {
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Filters in evaluation order.
    pub filters: Vec<FilterConfig>,
    /// Labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body modifying a preset. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetUpdate {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterConfig>>,
    /// New labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Preset listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetsResponse {
    /// Presets sorted by name.
    pub presets: Vec<FilterPreset>,
    /// Number of presets.
    pub count: usize,
}

/// Default filter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersResponse {
    /// Filters in evaluation order.
    pub filters: Vec<FilterConfig>,
    /// Number of filters.
    pub count: usize,
}

/// Request body replacing or validating filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersRequest {
    /// Filters in evaluation order.
    pub filters: Vec<FilterConfig>,
}

/// Result of validating filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterValidationResponse {
    /// Whether the chain builds.
    pub valid: bool,
    /// Normalised filters with defaults filled in.
    pub filters: Vec<FilterConfig>,
    /// Build error, when invalid.
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================================================
// Scans
// ============================================================================

/// An option contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Underlying symbol.
    pub underlying: String,
    /// Strike price.
    pub strike: f64,
    /// Expiration date (YYYY-MM-DD).
    pub expiration: String,
    /// Call or put.
    pub option_type: OptionType,
    /// Days to expiration.
    pub dte: u32,
    /// Best bid.
    pub bid: f64,
    /// Best ask.
    pub ask: f64,
    /// Last traded price.
    pub last: f64,
    /// Session volume.
    pub volume: u64,
    /// Open interest.
    pub open_interest: u64,
    /// Delta.
    pub delta: f64,
    /// Gamma.
    pub gamma: f64,
    /// Theta.
    pub theta: f64,
    /// Vega.
    pub vega: f64,
    /// Implied volatility.
    pub iv: f64,
    /// IV percentile.
    pub iv_percentile: f64,
    /// Absolute bid-ask spread.
    pub bid_ask_spread: f64,
    /// Bid-ask spread as a fraction of mid.
    pub bid_ask_spread_pct: f64,
    /// Liquidity score.
    pub liquidity: f64,
    /// Probability of finishing in the money.
    pub probability_itm: f64,
}

/// A ranked vertical spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadCandidate {
    /// Deterministic spread id.
    pub id: String,
    /// Debit or credit.
    pub strategy: SpreadStrategy,
    /// Call or put spread.
    pub option_type: OptionType,
    /// Underlying symbol.
    pub underlying: String,
    /// Shared expiration (YYYY-MM-DD).
    pub expiration: String,
    /// Bought leg.
    pub long_leg: OptionContract,
    /// Sold leg.
    pub short_leg: OptionContract,
    /// Strike distance.
    pub width: f64,
    /// Premium paid.
    pub net_debit: f64,
    /// Premium received.
    pub net_credit: f64,
    /// Best-case payoff.
    pub max_profit: f64,
    /// Worst-case loss.
    pub max_loss: f64,
    /// Breakeven underlying price.
    pub breakeven: f64,
    /// `max_profit / max_loss`.
    pub risk_reward: f64,
    /// Approximate probability of profit.
    pub probability_of_profit: f64,
    /// Ranking score.
    pub score: f64,
}

/// Result of scanning one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Scanned symbol.
    pub symbol: String,
    /// When the chain was fetched (RFC 3339).
    pub scan_time: String,
    /// Contracts in the fetched chain.
    pub total_contracts: usize,
    /// Contracts that passed every filter.
    pub filtered_count: usize,
    /// Returned rows.
    pub result_count: usize,
    /// Surviving contracts.
    pub options: Vec<OptionContract>,
    /// Ranked spreads.
    pub spreads: Vec<SpreadCandidate>,
}

/// Query parameters for a single-symbol scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanQuery {
    /// JSON-encoded filter list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<String>,
    /// Spread strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SpreadStrategy>,
    /// Maximum rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Batch scan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Symbols to scan.
    pub symbols: Vec<String>,
    /// Filter chain; the server defaults apply when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterConfig>>,
    /// Maximum rows per symbol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    /// Spread strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<SpreadStrategy>,
}

impl ScanRequest {
    /// Request for `symbols` with server defaults.
    #[must_use]
    pub fn new<S: Into<String>>(symbols: impl IntoIterator<Item = S>) -> Self {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            filters: None,
            max_results: None,
            strategy: None,
        }
    }
}

/// Outcome of one symbol in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolScanResponse {
    /// Normalised symbol.
    pub symbol: String,
    /// Result on success.
    #[serde(default)]
    pub result: Option<ScanResult>,
    /// Error on failure.
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// Batch scan response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchScanResponse {
    /// Per-symbol outcomes in request order.
    pub results: Vec<SymbolScanResponse>,
    /// Symbols that succeeded.
    pub succeeded: usize,
    /// Symbols that failed.
    pub failed: usize,
    /// Batch wall-clock time in milliseconds.
    pub elapsed_ms: u64,
}

// ============================================================================
// Cache & Statistics
// ============================================================================

/// Cache invalidation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInvalidationResponse {
    /// Targeted symbol.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Entries removed.
    pub removed: usize,
}

/// Per-filter statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterStatistics {
    /// Filter kind.
    pub kind: String,
    /// Contracts evaluated.
    pub evaluated: u64,
    /// Contracts passed.
    pub passed: u64,
    /// Pass rate.
    pub pass_rate: f64,
}

/// Aggregate scanner statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsResponse {
    /// Scans of any outcome.
    pub total_scans: u64,
    /// Successful scans.
    pub successful_scans: u64,
    /// Failed scans.
    pub failed_scans: u64,
    /// Timed-out scans.
    pub timed_out_scans: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// Cache hit ratio.
    pub cache_hit_ratio: f64,
    /// Cached results held.
    pub cache_entries: usize,
    /// Upstream fetch attempts.
    pub upstream_fetches: u64,
    /// Failed upstream fetch attempts.
    pub upstream_failures: u64,
    /// Contracts fed into filters.
    pub contracts_evaluated: u64,
    /// Contracts that survived filters.
    pub contracts_passed: u64,
    /// Mean filter reduction.
    pub average_filter_reduction: f64,
    /// Mean scan latency in milliseconds.
    pub average_scan_ms: f64,
    /// Spreads produced.
    pub spreads_found: u64,
    /// Rate limiter tokens available.
    pub rate_limit_tokens: f64,
    /// Callers waiting on the rate limiter.
    pub rate_limit_waiting: usize,
    /// Symbols with live subscribers.
    pub streaming_symbols: usize,
    /// Per-filter pass rates.
    pub filters: Vec<FilterStatistics>,
    /// Seconds since start.
    pub uptime_secs: u64,
}
