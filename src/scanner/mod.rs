//! Scan pipeline: plan, fetch, filter, pair into spreads, cache.

mod coordinator;
mod spreads;

pub use coordinator::{ScanCoordinator, SymbolScan};
pub use spreads::{SpreadCandidate, SpreadConstructor};

use crate::contract::OptionContract;
use crate::filters::{FilterChain, FilterError};
use crate::provider::FetchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

/// Longest accepted ticker.
const MAX_SYMBOL_LEN: usize = 12;

/// Vertical spread flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SpreadStrategy {
    /// Pay to open: long the nearer-the-money strike.
    Debit,
    /// Collect to open: short the nearer-the-money strike.
    Credit,
}

impl SpreadStrategy {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl std::fmt::Display for SpreadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scan errors. Cloned to every caller sharing a single-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// Filter configuration rejected before any work started.
    #[error("invalid filter configuration: {0}")]
    Config(#[from] FilterError),

    /// The symbol is empty or contains unsupported characters.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Upstream fetch failed after retries.
    #[error("upstream error for {symbol}: {source}")]
    Upstream {
        /// Symbol being scanned.
        symbol: String,
        /// Last fetch error.
        source: FetchError,
    },

    /// The scan exceeded its deadline.
    #[error("scan of {symbol} timed out after {timeout:?}")]
    Timeout {
        /// Symbol being scanned.
        symbol: String,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// The caller fetching this key went away before finishing.
    #[error("scan of {0} was abandoned before completing")]
    Aborted(String),
}

/// Result of scanning one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScanResult {
    /// Scanned symbol.
    pub symbol: String,
    /// When the chain was fetched.
    #[schema(value_type = String, format = DateTime)]
    pub scan_time: DateTime<Utc>,
    /// Contracts in the fetched chain.
    pub total_contracts: usize,
    /// Contracts that passed every filter.
    pub filtered_count: usize,
    /// Number of returned rows: spreads when a strategy was requested, options otherwise.
    pub result_count: usize,
    /// Surviving contracts, truncated to the result limit.
    pub options: Vec<OptionContract>,
    /// Ranked spread candidates, truncated to the result limit.
    pub spreads: Vec<SpreadCandidate>,
}

/// A validated, reusable description of what to compute for each symbol.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    chain: Arc<FilterChain>,
    canonical_filters: String,
    strategy: Option<SpreadStrategy>,
    limit: usize,
}

impl ScanPlan {
    /// Creates a plan.
    ///
    /// # Arguments
    /// * `chain` - Filter chain applied to every fetched contract.
    /// * `strategy` - Spread strategy, or `None` for filtered options only.
    /// * `limit` - Maximum rows returned per symbol.
    #[must_use]
    pub fn new(chain: Arc<FilterChain>, strategy: Option<SpreadStrategy>, limit: usize) -> Self {
        Self {
            canonical_filters: chain.canonical_json(),
            chain,
            strategy,
            limit,
        }
    }

    /// Filter chain.
    #[must_use]
    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Spread strategy, if any.
    #[must_use]
    pub fn strategy(&self) -> Option<SpreadStrategy> {
        self.strategy
    }

    /// Result limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Deterministic cache key for `symbol` under this plan.
    ///
    /// SHA-256 over the canonical JSON of symbol, sorted filters, strategy and
    /// limit. Logically identical requests collide regardless of filter order.
    #[must_use]
    pub fn cache_key(&self, symbol: &str) -> String {
        let canonical = serde_json::json!({
            "symbol": symbol.trim().to_ascii_uppercase(),
            "filters": self.canonical_filters,
            "strategy": self.strategy,
            "limit": self.limit,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        format!("{:x}", digest)
    }
}

/// Trims and upper-cases a ticker, rejecting anything that is not one.
///
/// # Errors
/// Returns [`ScanError::InvalidSymbol`] for empty, overlong or non-ticker input.
pub fn normalize_symbol(symbol: &str) -> Result<String, ScanError> {
    let normalized = symbol.trim().to_ascii_uppercase();
    let valid = !normalized.is_empty()
        && normalized.len() <= MAX_SYMBOL_LEN
        && normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if valid {
        Ok(normalized)
    } else {
        Err(ScanError::InvalidSymbol(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::RawFilterConfig;
    use serde_json::json;

    fn plan(filters: &[RawFilterConfig], strategy: Option<SpreadStrategy>, limit: usize) -> ScanPlan {
        ScanPlan::new(
            Arc::new(FilterChain::from_raw(filters).unwrap()),
            strategy,
            limit,
        )
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let a = plan(
            &[
                RawFilterConfig::new("delta", json!({"min": 0.2, "max": 0.35})),
                RawFilterConfig::new("dte", json!({"min": 30, "max": 60})),
            ],
            Some(SpreadStrategy::Credit),
            10,
        );
        let b = plan(
            &[
                RawFilterConfig::new("dte", json!({"max": 60, "min": 30})),
                RawFilterConfig::new("delta", json!({"max": 0.35, "min": 0.2})),
            ],
            Some(SpreadStrategy::Credit),
            10,
        );

        assert_eq!(a.cache_key("AAPL"), b.cache_key(" aapl "));
        assert_eq!(a.cache_key("AAPL").len(), 64);
    }

    #[test]
    fn test_cache_key_distinguishes_inputs() {
        let filters = [RawFilterConfig::new("volume", json!({"min": 10}))];
        let base = plan(&filters, Some(SpreadStrategy::Debit), 10);

        assert_ne!(base.cache_key("AAPL"), base.cache_key("MSFT"));
        assert_ne!(
            base.cache_key("AAPL"),
            plan(&filters, Some(SpreadStrategy::Credit), 10).cache_key("AAPL")
        );
        assert_ne!(
            base.cache_key("AAPL"),
            plan(&filters, Some(SpreadStrategy::Debit), 5).cache_key("AAPL")
        );
        assert_ne!(base.cache_key("AAPL"), plan(&[], Some(SpreadStrategy::Debit), 10).cache_key("AAPL"));
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" brk.b ").unwrap(), "BRK.B");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("   ").is_err());
        assert!(normalize_symbol("AA PL").is_err());
        assert!(normalize_symbol("ABCDEFGHIJKLM").is_err());
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::Upstream {
            symbol: "BADSYM".to_string(),
            source: FetchError::UnknownSymbol("BADSYM".to_string()),
        };
        assert_eq!(err.to_string(), "upstream error for BADSYM: unknown symbol: BADSYM");
    }
}
