//! Scan orchestration: cache, single-flight, rate-limited fetch, fan-out.

use super::{
    ScanError, ScanPlan, ScanResult, SpreadConstructor, SpreadStrategy, normalize_symbol,
};
use crate::cache::ScanCache;
use crate::config::{ScannerConfig, SpreadConfig};
use crate::contract::OptionContract;
use crate::filters::{FilterChain, RawFilterConfig};
use crate::metrics::{Metrics, ScanEvent, ScanOutcome};
use crate::provider::MarketDataProvider;
use crate::rate_limiter::{Priority, RateLimiter};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use futures::stream;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Flight = Option<Result<Arc<ScanResult>, ScanError>>;
type InFlight = DashMap<String, watch::Receiver<Flight>>;

/// Outcome of one symbol in a batch.
#[derive(Debug, Clone)]
pub struct SymbolScan {
    /// Symbol as requested (normalized when valid).
    pub symbol: String,
    /// Result or per-symbol error.
    pub result: Result<Arc<ScanResult>, ScanError>,
}

/// Releases a single-flight slot. Dropping without [`FlightGuard::complete`]
/// (cancellation, timeout, panic) wakes waiters with [`ScanError::Aborted`].
struct FlightGuard {
    key: String,
    symbol: String,
    in_flight: Arc<InFlight>,
    tx: Option<watch::Sender<Flight>>,
}

impl FlightGuard {
    fn complete(mut self, result: Result<Arc<ScanResult>, ScanError>) {
        if let Some(tx) = self.tx.take() {
            self.release(tx, result);
        }
    }

    fn release(&self, tx: watch::Sender<Flight>, result: Result<Arc<ScanResult>, ScanError>) {
        tx.send_replace(Some(result));
        let ours = tx.subscribe();
        self.in_flight
            .remove_if(&self.key, |_, rx| rx.same_channel(&ours));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            debug!("Abandoning in-flight scan of {}", self.symbol);
            self.release(tx, Err(ScanError::Aborted(self.symbol.clone())));
        }
    }
}

/// Shared entry point for every scan.
///
/// One coordinator serves all callers. The cache and the rate limiter are the
/// only shared mutable state; single-flight waiters block on a watch channel,
/// never on a lock held across upstream I/O.
pub struct ScanCoordinator {
    provider: Arc<dyn MarketDataProvider>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ScanCache>,
    spreads: SpreadConstructor,
    metrics: Metrics,
    config: ScannerConfig,
    chains: DashMap<String, Arc<FilterChain>>,
    in_flight: Arc<InFlight>,
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("provider", &self.provider.name())
            .field("cache_entries", &self.cache.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl ScanCoordinator {
    /// Creates a coordinator.
    ///
    /// # Arguments
    /// * `provider` - Upstream chain source.
    /// * `limiter` - Token bucket guarding the provider.
    /// * `config` - Timeouts, concurrency, retries and cache TTL.
    /// * `spreads` - Spread width bounds and scoring weights.
    /// * `metrics` - Instrumentation handle.
    #[must_use]
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        limiter: Arc<RateLimiter>,
        config: ScannerConfig,
        spreads: SpreadConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            provider,
            limiter,
            cache: Arc::new(ScanCache::new(config.cache_ttl())),
            spreads: SpreadConstructor::new(spreads),
            metrics,
            config,
            chains: DashMap::new(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Scanner settings.
    #[must_use]
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Result cache.
    #[must_use]
    pub fn cache(&self) -> &ScanCache {
        &self.cache
    }

    /// Upstream rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Provider name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Number of keys currently being fetched.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Validates filters and resolves defaults into a reusable plan.
    ///
    /// Chains are memoised by their canonical form, so equal configurations
    /// share one chain. The memo holds at most `max_memoized_chains` entries;
    /// when full, chains no plan still holds are evicted, and if every entry
    /// is in use the new chain is returned without being memoised.
    ///
    /// # Errors
    /// Returns [`ScanError::Config`] for unknown kinds or malformed parameters.
    pub fn plan(
        &self,
        filters: &[RawFilterConfig],
        strategy: Option<SpreadStrategy>,
        limit: Option<usize>,
    ) -> Result<ScanPlan, ScanError> {
        let chain = self.memoize(FilterChain::from_raw(filters)?);

        let limit = limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit.max(1));

        Ok(ScanPlan::new(chain, strategy, limit))
    }

    /// Number of memoised filter chains.
    #[must_use]
    pub fn memoized_chains(&self) -> usize {
        self.chains.len()
    }

    fn memoize(&self, chain: FilterChain) -> Arc<FilterChain> {
        let key = chain.canonical_json();
        if let Some(existing) = self.chains.get(&key) {
            return Arc::clone(existing.value());
        }

        let capacity = self.config.max_memoized_chains;
        if self.chains.len() >= capacity {
            self.chains.retain(|_, chain| Arc::strong_count(chain) > 1);
            if self.chains.len() >= capacity {
                debug!("Chain memo full ({} entries), not memoising", capacity);
                return Arc::new(chain);
            }
        }

        self.chains
            .entry(key)
            .or_insert_with(|| Arc::new(chain))
            .clone()
    }

    /// Scans one symbol under the configured deadline.
    ///
    /// # Errors
    /// Returns a [`ScanError`] for invalid symbols, exhausted upstream retries,
    /// deadline expiry or an abandoned shared fetch.
    pub async fn scan_symbol(
        &self,
        symbol: &str,
        plan: &ScanPlan,
        priority: Priority,
    ) -> Result<Arc<ScanResult>, ScanError> {
        let symbol = normalize_symbol(symbol)?;
        let started = Instant::now();
        let timeout = self.config.scan_timeout();

        let result = match tokio::time::timeout(timeout, self.run(&symbol, plan, priority)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Scan of {} timed out after {:?}", symbol, timeout);
                Err(ScanError::Timeout {
                    symbol: symbol.clone(),
                    timeout,
                })
            }
        };

        let (outcome, shared, contracts_in, contracts_out) = match &result {
            Ok((scan, shared)) => (
                ScanOutcome::Success,
                *shared,
                scan.total_contracts,
                scan.filtered_count,
            ),
            Err(ScanError::Timeout { .. }) => (ScanOutcome::Timeout, false, 0, 0),
            Err(ScanError::Aborted(_)) => (ScanOutcome::Aborted, true, 0, 0),
            Err(_) => (ScanOutcome::UpstreamError, false, 0, 0),
        };
        self.metrics.scan(&ScanEvent {
            symbol: &symbol,
            outcome,
            duration: started.elapsed(),
            shared,
            contracts_in,
            contracts_out,
        });

        result.map(|(scan, _)| scan)
    }

    /// Scans several symbols with bounded concurrency.
    ///
    /// Duplicates are scanned once. Results come back in request order and
    /// one symbol's failure never affects its siblings.
    pub async fn scan_many(
        &self,
        symbols: &[String],
        plan: &ScanPlan,
        priority: Priority,
    ) -> Vec<SymbolScan> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        let mut results: Vec<(usize, SymbolScan)> = stream::iter(unique.into_iter().enumerate())
            .map(|(index, symbol)| async move {
                let result = self.scan_symbol(&symbol, plan, priority).await;
                (index, SymbolScan { symbol, result })
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, scan)| scan).collect()
    }

    /// Drops every cached result for `symbol`.
    pub fn invalidate_symbol(&self, symbol: &str) -> usize {
        let removed = self.cache.invalidate_symbol(symbol);
        info!("Invalidated {} cache entries for {}", removed, symbol);
        removed
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        info!("Cleared {} cache entries", removed);
        removed
    }

    /// Periodically purges expired cache entries.
    pub fn spawn_cache_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let period = self.config.cache_sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = coordinator.cache.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired cache entries", purged);
                }
            }
        })
    }

    /// Cache lookup, then single-flight. The bool is true when the result was
    /// produced by someone else (cache hit or another caller's fetch).
    async fn run(
        &self,
        symbol: &str,
        plan: &ScanPlan,
        priority: Priority,
    ) -> Result<(Arc<ScanResult>, bool), ScanError> {
        let key = plan.cache_key(symbol);

        if let Some(hit) = self.cache.get(&key) {
            self.metrics.cache_hit();
            debug!("Cache hit for {}", symbol);
            return Ok((hit, true));
        }
        self.metrics.cache_miss();

        let claim = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => Err(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx);
                Ok(tx)
            }
        };
        let tx = match claim {
            Ok(tx) => tx,
            Err(rx) => return Self::wait(symbol, rx).await.map(|r| (r, true)),
        };

        let guard = FlightGuard {
            key: key.clone(),
            symbol: symbol.to_string(),
            in_flight: Arc::clone(&self.in_flight),
            tx: Some(tx),
        };

        // A previous owner may have filled the cache between our miss and claiming the slot.
        if let Some(hit) = self.cache.get(&key) {
            guard.complete(Ok(Arc::clone(&hit)));
            return Ok((hit, true));
        }

        let result = self.execute(symbol, plan, priority).await;
        if let Ok(scan) = &result {
            self.cache.insert(key, Arc::clone(scan));
        }
        guard.complete(result.clone());
        result.map(|r| (r, false))
    }

    async fn wait(
        symbol: &str,
        mut rx: watch::Receiver<Flight>,
    ) -> Result<Arc<ScanResult>, ScanError> {
        debug!("Waiting on in-flight scan of {}", symbol);
        let flight = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        flight.unwrap_or_else(|| Err(ScanError::Aborted(symbol.to_string())))
    }

    async fn execute(
        &self,
        symbol: &str,
        plan: &ScanPlan,
        priority: Priority,
    ) -> Result<Arc<ScanResult>, ScanError> {
        let contracts = self.fetch(symbol, priority).await?;
        let scan_time = Utc::now();

        let outcome = plan.chain().run(contracts);
        for stat in &outcome.stats {
            self.metrics.filter(stat);
        }
        let filtered_count = outcome.survivors.len();

        let spreads = match plan.strategy() {
            Some(strategy) if plan.chain().has_spread_filters() => {
                let built = self.spreads.build(&outcome.survivors, strategy, usize::MAX);
                let (mut spreads, stats) = plan.chain().filter_spreads(built);
                for stat in &stats {
                    self.metrics.filter(stat);
                }
                spreads.truncate(plan.limit());
                self.metrics.spreads_found(symbol, spreads.len());
                spreads
            }
            Some(strategy) => {
                let spreads = self.spreads.build(&outcome.survivors, strategy, plan.limit());
                self.metrics.spreads_found(symbol, spreads.len());
                spreads
            }
            None => Vec::new(),
        };

        let mut options = outcome.survivors;
        options.truncate(plan.limit());
        let result_count = if plan.strategy().is_some() {
            spreads.len()
        } else {
            options.len()
        };

        debug!(
            "Scanned {}: {} contracts, {} passed filters in {:?}, {} results",
            symbol, outcome.input_count, filtered_count, outcome.elapsed, result_count
        );

        Ok(Arc::new(ScanResult {
            symbol: symbol.to_string(),
            scan_time,
            total_contracts: outcome.input_count,
            filtered_count,
            result_count,
            options,
            spreads,
        }))
    }

    /// Rate-limited fetch with exponential backoff on retryable errors.
    async fn fetch(
        &self,
        symbol: &str,
        priority: Priority,
    ) -> Result<Vec<OptionContract>, ScanError> {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire(priority).await;

            match self.provider.fetch_chain(symbol).await {
                Ok(chain) => {
                    self.metrics.upstream_fetch(symbol, chain.len(), true);
                    return Ok(chain);
                }
                Err(e) => {
                    self.metrics.upstream_fetch(symbol, 0, false);
                    if e.is_retryable() && attempt < self.config.max_retries {
                        let backoff = self
                            .config
                            .retry_backoff()
                            .saturating_mul(1 << attempt.min(16));
                        warn!(
                            "Fetch of {} failed ({}), retry {} in {:?}",
                            symbol,
                            e,
                            attempt + 1,
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ScanError::Upstream {
                        symbol: symbol.to_string(),
                        source: e,
                    });
                }
            }
        }
    }
}
