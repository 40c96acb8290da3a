//! Market-data providers.
//!
//! The scanner only needs one operation from the outside world: fetch the
//! full option chain for a symbol. [`MarketDataProvider`] is that seam.
//! [`SimulatedProvider`] synthesises Black-Scholes chains for configured
//! assets; [`HttpProvider`] pulls chains from a market-data sidecar.

mod http;
mod simulated;

pub use http::HttpProvider;
pub use simulated::{BlackScholes, SimulatedProvider};

use crate::config::{ProviderConfig, ProviderKind};
use crate::contract::OptionContract;
use async_trait::async_trait;
use std::sync::Arc;

/// Upstream fetch errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The provider does not know the symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// The provider did not answer in time.
    #[error("upstream request timed out")]
    Timeout,

    /// The provider could not be reached.
    #[error("upstream connection failed: {0}")]
    Connection(String),

    /// The provider rejected the request for exceeding its rate limit.
    #[error("upstream rate limit exceeded")]
    RateLimited,

    /// The provider answered with an unexpected HTTP status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// The payload could not be decoded.
    #[error("failed to decode upstream payload: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether a retry has a chance of succeeding.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::RateLimited => true,
            Self::Status(code) => *code >= 500,
            Self::UnknownSymbol(_) | Self::Decode(_) => false,
        }
    }
}

/// Source of option chains.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetches every listed contract for `symbol`, derived fields populated.
    ///
    /// # Errors
    /// Returns a [`FetchError`] describing why the chain is unavailable.
    async fn fetch_chain(&self, symbol: &str) -> Result<Vec<OptionContract>, FetchError>;

    /// Short provider name for logs and health output.
    fn name(&self) -> &'static str;
}

/// Builds the provider selected in configuration.
///
/// # Errors
/// Returns an error if the HTTP client cannot be constructed.
pub fn from_config(config: &ProviderConfig) -> Result<Arc<dyn MarketDataProvider>, FetchError> {
    let provider: Arc<dyn MarketDataProvider> = match config.kind {
        ProviderKind::Simulated => Arc::new(SimulatedProvider::new(
            config.assets.clone(),
            config.risk_free_rate,
            config.simulated_latency(),
        )),
        ProviderKind::Http => Arc::new(HttpProvider::new(
            &config.base_url,
            config.request_timeout(),
        )?),
    };
    Ok(provider)
}
