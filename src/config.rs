//! Configuration module for loading and parsing TOML configuration files.

use crate::filters::{FilterChain, RawFilterConfig};
use crate::rate_limiter::RateLimiterConfig;
use crate::scanner::SpreadStrategy;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Invalid configuration value.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Scan pipeline configuration.
    pub scanner: ScannerConfig,
    /// Upstream rate limit.
    pub rate_limit: RateLimitConfig,
    /// Spread construction and scoring.
    pub spreads: SpreadConfig,
    /// Live scan streaming.
    pub streaming: StreamingConfig,
    /// Market-data provider.
    pub provider: ProviderConfig,
    /// Default filter configuration used when a request supplies none.
    pub filters: Vec<RawFilterConfig>,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Scan pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Overall deadline for one symbol, in milliseconds.
    pub scan_timeout_ms: u64,
    /// Symbols scanned in parallel within one batch.
    pub max_concurrency: usize,
    /// Cached result lifetime, in seconds.
    pub cache_ttl_secs: u64,
    /// Retries after a retryable upstream error.
    pub max_retries: u32,
    /// First retry delay in milliseconds, doubled on each retry.
    pub retry_backoff_ms: u64,
    /// Result limit when the request does not set one.
    pub default_limit: usize,
    /// Largest accepted result limit.
    pub max_limit: usize,
    /// Spread strategy when the request does not set one. Unset returns options only.
    pub default_strategy: Option<SpreadStrategy>,
    /// Expired cache entry sweep period, in seconds.
    pub cache_sweep_interval_secs: u64,
    /// Distinct filter chains kept for reuse across plans.
    pub max_memoized_chains: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 30_000,
            max_concurrency: 10,
            cache_ttl_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 200,
            default_limit: 50,
            max_limit: 500,
            default_strategy: None,
            cache_sweep_interval_secs: 30,
            max_memoized_chains: 256,
        }
    }
}

impl ScannerConfig {
    /// Scan deadline.
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Cache entry lifetime.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// First retry delay.
    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Cache sweep period.
    #[must_use]
    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.max(1))
    }
}

/// Upstream rate limit configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Provider's documented maximum sustained requests per second.
    pub max_requests_per_second: f64,
    /// Fraction of the maximum actually used.
    pub safety_factor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 50.0,
            safety_factor: 0.9,
        }
    }
}

impl RateLimitConfig {
    /// Token bucket dimensions.
    #[must_use]
    pub fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::with_safety_margin(self.max_requests_per_second, self.safety_factor)
    }
}

/// Spread construction and scoring.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpreadConfig {
    /// Narrowest strike distance.
    pub min_width: f64,
    /// Widest strike distance.
    pub max_width: f64,
    /// Weight of the normalised risk/reward ratio in the score.
    pub risk_reward_weight: f64,
    /// Weight of the probability of profit in the score.
    pub probability_weight: f64,
    /// Risk/reward at which its score contribution saturates.
    pub risk_reward_cap: f64,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            min_width: 1.0,
            max_width: 20.0,
            risk_reward_weight: 0.5,
            probability_weight: 0.5,
            risk_reward_cap: 3.0,
        }
    }
}

/// Live scan streaming.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Whether the background streamer runs.
    pub enabled: bool,
    /// Rescan period for subscribed symbols, in milliseconds.
    pub interval_ms: u64,
    /// WebSocket heartbeat period, in seconds.
    pub heartbeat_secs: u64,
    /// Strategy used for streamed scans.
    pub strategy: SpreadStrategy,
    /// Result limit for streamed scans.
    pub limit: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            heartbeat_secs: 30,
            strategy: SpreadStrategy::Credit,
            limit: 20,
        }
    }
}

impl StreamingConfig {
    /// Rescan period.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Heartbeat period.
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

/// Which market-data provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Black-Scholes chains for configured assets.
    #[default]
    Simulated,
    /// HTTP market-data sidecar.
    Http,
}

/// Market-data provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider implementation.
    pub kind: ProviderKind,
    /// Sidecar base URL for the HTTP provider.
    pub base_url: String,
    /// HTTP request timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// Risk-free rate for simulated pricing.
    pub risk_free_rate: f64,
    /// Artificial latency added to simulated fetches, in milliseconds.
    pub latency_ms: u64,
    /// Assets known to the simulated provider.
    pub assets: Vec<AssetConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Simulated,
            base_url: "http://localhost:8081".to_string(),
            request_timeout_ms: 10_000,
            risk_free_rate: 0.05,
            latency_ms: 0,
            assets: vec![
                AssetConfig::new("AAPL", 190.0, 0.28, 45.0, 5.0),
                AssetConfig::new("MSFT", 410.0, 0.24, 35.0, 5.0),
                AssetConfig::new("SPY", 500.0, 0.16, 30.0, 5.0),
                AssetConfig::new("QQQ", 430.0, 0.20, 40.0, 5.0),
                AssetConfig::new("TSLA", 250.0, 0.55, 70.0, 5.0),
            ],
        }
    }
}

impl ProviderConfig {
    /// HTTP request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Simulated fetch latency.
    #[must_use]
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Asset configuration for the simulated provider.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    /// Asset symbol (e.g., "AAPL", "SPY").
    pub symbol: String,
    /// Underlying price in dollars.
    pub spot: f64,
    /// Annualized at-the-money volatility (0.0 to 5.0).
    pub volatility: f64,
    /// Implied volatility percentile reported for every contract.
    #[serde(default = "default_iv_percentile")]
    pub iv_percentile: f64,
    /// Listed expirations as days from today.
    #[serde(default = "default_expirations")]
    pub expirations: Vec<u32>,
    /// Number of strikes per expiration.
    #[serde(default = "default_num_strikes")]
    pub num_strikes: u32,
    /// Strike spacing in dollars.
    pub strike_spacing: f64,
    /// Quoted bid-ask width in basis points of theoretical value.
    #[serde(default = "default_spread_bps")]
    pub spread_bps: u64,
    /// Volume at the money; open interest is four times volume.
    #[serde(default = "default_base_volume")]
    pub base_volume: u64,
    /// Volatility smile curvature.
    #[serde(default = "default_smile")]
    pub smile: f64,
}

fn default_iv_percentile() -> f64 {
    50.0
}

fn default_expirations() -> Vec<u32> {
    vec![7, 14, 30, 45, 60, 90]
}

fn default_num_strikes() -> u32 {
    21
}

fn default_spread_bps() -> u64 {
    400
}

fn default_base_volume() -> u64 {
    5_000
}

fn default_smile() -> f64 {
    0.5
}

impl AssetConfig {
    /// Creates an asset with default listing parameters.
    #[must_use]
    pub fn new(
        symbol: &str,
        spot: f64,
        volatility: f64,
        iv_percentile: f64,
        strike_spacing: f64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            spot,
            volatility,
            iv_percentile,
            expirations: default_expirations(),
            num_strikes: default_num_strikes(),
            strike_spacing,
            spread_bps: default_spread_bps(),
            base_volume: default_base_volume(),
            smile: default_smile(),
        }
    }

    /// Generates strike prices centered around the spot price, rounded to the spacing.
    #[must_use]
    pub fn generate_strikes(&self) -> Vec<f64> {
        let center = (self.spot / self.strike_spacing).round() * self.strike_spacing;
        let half_count = self.num_strikes / 2;

        (0..self.num_strikes)
            .map(|i| center + (f64::from(i) - f64::from(half_count)) * self.strike_spacing)
            .filter(|strike| *strike > 0.0)
            .collect()
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Arguments
    /// * `content` - TOML content as string.
    ///
    /// # Errors
    /// Returns error if content cannot be parsed.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `CONFIG_PATH` (default `config.toml`), falling
    /// back to built-in defaults when it does not exist, then applies the
    /// `HOST` and `PORT` overrides.
    ///
    /// # Errors
    /// Returns error if the file exists but is invalid, or `PORT` is not a port.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            info!("Loading configuration from {}", path);
            Self::load(&path)?
        } else {
            info!("No configuration file at {}, using defaults", path);
            Self::default()
        };

        if let Ok(host) = std::env::var("HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("PORT {port:?} is not a port")))?;
        }

        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidValue(msg));

        if self.scanner.scan_timeout_ms == 0 {
            return invalid("scanner.scan_timeout_ms must be positive".to_string());
        }
        if self.scanner.max_concurrency == 0 {
            return invalid("scanner.max_concurrency must be positive".to_string());
        }
        if self.scanner.max_memoized_chains == 0 {
            return invalid("scanner.max_memoized_chains must be positive".to_string());
        }
        if self.scanner.default_limit == 0 || self.scanner.default_limit > self.scanner.max_limit {
            return invalid("scanner.default_limit must be in 1..=max_limit".to_string());
        }

        let rl = &self.rate_limit;
        if !(rl.max_requests_per_second > 0.0 && rl.max_requests_per_second.is_finite()) {
            return invalid("rate_limit.max_requests_per_second must be positive".to_string());
        }
        if !(rl.safety_factor > 0.0 && rl.safety_factor <= 1.0) {
            return invalid("rate_limit.safety_factor must be in (0, 1]".to_string());
        }

        let sp = &self.spreads;
        if sp.min_width < 0.0 || sp.max_width < sp.min_width {
            return invalid(format!(
                "spreads width bounds [{}, {}] are inverted",
                sp.min_width, sp.max_width
            ));
        }
        if sp.risk_reward_weight < 0.0 || sp.probability_weight < 0.0 {
            return invalid("spreads weights must be non-negative".to_string());
        }
        if sp.risk_reward_cap <= 0.0 {
            return invalid("spreads.risk_reward_cap must be positive".to_string());
        }

        if self.streaming.limit == 0 {
            return invalid("streaming.limit must be positive".to_string());
        }

        if self.provider.kind == ProviderKind::Http && self.provider.base_url.is_empty() {
            return invalid("provider.base_url is required for the http provider".to_string());
        }
        for asset in &self.provider.assets {
            if asset.symbol.is_empty() {
                return invalid("asset symbol cannot be empty".to_string());
            }
            if asset.spot <= 0.0 {
                return invalid(format!("asset {} spot must be positive", asset.symbol));
            }
            if asset.volatility <= 0.0 || asset.volatility > 5.0 {
                return invalid(format!(
                    "asset {} volatility must be between 0 and 5",
                    asset.symbol
                ));
            }
            if asset.expirations.is_empty() {
                return invalid(format!(
                    "asset {} must have at least one expiration",
                    asset.symbol
                ));
            }
            if asset.num_strikes == 0 {
                return invalid(format!("asset {} num_strikes must be positive", asset.symbol));
            }
            if asset.strike_spacing <= 0.0 {
                return invalid(format!(
                    "asset {} strike_spacing must be positive",
                    asset.symbol
                ));
            }
        }

        FilterChain::from_raw(&self.filters)
            .map_err(|e| ConfigError::InvalidValue(format!("default filters: {e}")))?;

        Ok(())
    }
}
