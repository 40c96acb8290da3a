//! Application state management.

use crate::config::Config;
use crate::filters::RawFilterConfig;
use crate::metrics::{Metrics, MetricsSink, ScannerMetrics};
use crate::presets::PresetStore;
use crate::provider::MarketDataProvider;
use crate::rate_limiter::RateLimiter;
use crate::scanner::ScanCoordinator;
use crate::streaming::ScanStreamer;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared scan coordinator.
    pub coordinator: Arc<ScanCoordinator>,
    /// Default filter configuration used when a request supplies none.
    pub default_filters: Arc<RwLock<Vec<RawFilterConfig>>>,
    /// Metrics registry backing statistics and exposition.
    pub metrics: Arc<ScannerMetrics>,
    /// Live scan streamer.
    pub streamer: Arc<ScanStreamer>,
    /// Named filter presets.
    pub presets: Arc<PresetStore>,
    /// Application configuration.
    pub config: Config,
}

impl AppState {
    /// Wires the scan pipeline from configuration.
    ///
    /// # Arguments
    /// * `config` - Validated application configuration.
    /// * `provider` - Market-data provider the coordinator fetches from.
    #[must_use]
    pub fn new(config: Config, provider: Arc<dyn MarketDataProvider>) -> Self {
        let registry = Arc::new(ScannerMetrics::new());
        let sink: Arc<dyn MetricsSink> = registry.clone();
        let limiter_config = config.rate_limit.limiter_config();
        info!(
            "Upstream rate limit: capacity {}, refill {:.1}/s",
            limiter_config.capacity, limiter_config.refill_per_second
        );

        let coordinator = Arc::new(ScanCoordinator::new(
            provider,
            Arc::new(RateLimiter::new(limiter_config)),
            config.scanner.clone(),
            config.spreads,
            Metrics::new(sink),
        ));
        let default_filters = Arc::new(RwLock::new(config.filters.clone()));
        let streamer = Arc::new(ScanStreamer::new(
            Arc::clone(&coordinator),
            Arc::clone(&default_filters),
            config.streaming.clone(),
        ));

        Self {
            coordinator,
            default_filters,
            metrics: registry,
            streamer,
            presets: Arc::new(PresetStore::with_defaults()),
            config,
        }
    }

    /// Snapshot of the current default filters.
    #[must_use]
    pub fn default_filters(&self) -> Vec<RawFilterConfig> {
        self.default_filters.read().clone()
    }
}
