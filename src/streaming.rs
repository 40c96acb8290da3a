//! Live scan streaming.
//!
//! WebSocket sessions subscribe to symbols under a [`StreamProfile`]: either
//! the live default filters or a session's own filter list. The streamer
//! periodically rescans every (profile, symbol) pair at low rate-limiter
//! priority and broadcasts the spread delta when it changed.

use crate::config::StreamingConfig;
use crate::filters::{FilterChain, RawFilterConfig};
use crate::rate_limiter::Priority;
use crate::scanner::{ScanCoordinator, ScanError, ScanPlan, SpreadCandidate, normalize_symbol};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Profile key of sessions that follow the default filters.
pub const DEFAULT_PROFILE: &str = "default";

/// Event broadcast to streaming subscribers.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The spread set of a subscribed symbol changed.
    ScanUpdate {
        /// Profile the scan ran under.
        profile: String,
        /// Symbol.
        symbol: String,
        /// When the underlying chain was fetched.
        scan_time: DateTime<Utc>,
        /// Spreads in the current result.
        result_count: usize,
        /// Spreads not present in the previous result.
        added: Vec<SpreadCandidate>,
        /// Ids of spreads that disappeared.
        removed: Vec<String>,
    },
    /// A rescan failed.
    ScanError {
        /// Profile the scan ran under.
        profile: String,
        /// Symbol.
        symbol: String,
        /// Error message.
        error: String,
    },
}

impl StreamEvent {
    /// Symbol the event concerns.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::ScanUpdate { symbol, .. } | Self::ScanError { symbol, .. } => symbol,
        }
    }

    /// Profile key the event was produced under.
    #[must_use]
    pub fn profile(&self) -> &str {
        match self {
            Self::ScanUpdate { profile, .. } | Self::ScanError { profile, .. } => profile,
        }
    }
}

/// Filter set a subscription streams under.
///
/// Sessions with equal filter lists, in any order, share one key and so one
/// rescan per symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProfile {
    key: String,
    filters: Option<Vec<RawFilterConfig>>,
}

impl Default for StreamProfile {
    fn default() -> Self {
        Self {
            key: DEFAULT_PROFILE.to_string(),
            filters: None,
        }
    }
}

impl StreamProfile {
    /// Validates `filters` and derives the profile. `None` follows the
    /// default filters.
    ///
    /// # Errors
    /// Returns [`ScanError::Config`] when the filters do not build a chain.
    pub fn new(filters: Option<Vec<RawFilterConfig>>) -> Result<Self, ScanError> {
        match filters {
            None => Ok(Self::default()),
            Some(filters) => Ok(Self {
                key: FilterChain::from_raw(&filters)?.canonical_json(),
                filters: Some(filters),
            }),
        }
    }

    /// Grouping key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Session filters, or `None` for the defaults.
    #[must_use]
    pub fn filters(&self) -> Option<&[RawFilterConfig]> {
        self.filters.as_deref()
    }
}

type SubscriptionKey = (String, String);

#[derive(Debug)]
struct Subscription {
    sessions: usize,
    filters: Option<Vec<RawFilterConfig>>,
}

/// Periodic rescanner for subscribed symbols.
pub struct ScanStreamer {
    coordinator: Arc<ScanCoordinator>,
    default_filters: Arc<RwLock<Vec<RawFilterConfig>>>,
    config: StreamingConfig,
    /// (profile, symbol) -> subscribed sessions.
    subscriptions: DashMap<SubscriptionKey, Subscription>,
    /// (profile, symbol) -> spread ids from the last emitted result.
    last_ids: DashMap<SubscriptionKey, HashSet<String>>,
    event_tx: broadcast::Sender<StreamEvent>,
}

impl ScanStreamer {
    /// Creates a streamer.
    ///
    /// # Arguments
    /// * `coordinator` - Shared scan coordinator.
    /// * `default_filters` - Live default filter configuration.
    /// * `config` - Rescan period, strategy and limit.
    #[must_use]
    pub fn new(
        coordinator: Arc<ScanCoordinator>,
        default_filters: Arc<RwLock<Vec<RawFilterConfig>>>,
        config: StreamingConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            coordinator,
            default_filters,
            config,
            subscriptions: DashMap::new(),
            last_ids: DashMap::new(),
            event_tx,
        }
    }

    /// Returns a receiver for stream events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// Streaming settings.
    #[must_use]
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Registers one session's interest in `symbols` under `profile`.
    ///
    /// Returns the normalized symbols accepted and the raw inputs rejected.
    pub fn subscribe(&self, profile: &StreamProfile, symbols: &[String]) -> (Vec<String>, Vec<String>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for raw in symbols {
            match normalize_symbol(raw) {
                Ok(symbol) if !accepted.contains(&symbol) => {
                    self.subscriptions
                        .entry((profile.key.clone(), symbol.clone()))
                        .or_insert_with(|| Subscription {
                            sessions: 0,
                            filters: profile.filters.clone(),
                        })
                        .sessions += 1;
                    accepted.push(symbol);
                }
                Ok(_) => {}
                Err(_) => rejected.push(raw.clone()),
            }
        }
        if !accepted.is_empty() {
            debug!("Subscribed to {:?} under profile {}", accepted, profile.key);
        }
        (accepted, rejected)
    }

    /// Drops one session's interest in `symbols` under `profile`.
    pub fn unsubscribe(&self, profile: &StreamProfile, symbols: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        for raw in symbols {
            let Ok(symbol) = normalize_symbol(raw) else {
                continue;
            };
            let key = (profile.key.clone(), symbol);
            let gone = match self.subscriptions.get_mut(&key) {
                Some(mut sub) => {
                    sub.sessions = sub.sessions.saturating_sub(1);
                    sub.sessions == 0
                }
                None => continue,
            };
            if gone {
                self.subscriptions.remove_if(&key, |_, sub| sub.sessions == 0);
                self.last_ids.remove(&key);
            }
            removed.push(key.1);
        }
        removed
    }

    /// Symbols with at least one subscriber under any profile, sorted.
    #[must_use]
    pub fn subscribed_symbols(&self) -> Vec<String> {
        let symbols: BTreeSet<String> = self
            .subscriptions
            .iter()
            .filter(|e| e.value().sessions > 0)
            .map(|e| e.key().1.clone())
            .collect();
        symbols.into_iter().collect()
    }

    /// Distinct profiles with live subscriptions.
    #[must_use]
    pub fn active_profiles(&self) -> usize {
        self.subscriptions
            .iter()
            .map(|e| e.key().0.clone())
            .collect::<HashSet<_>>()
            .len()
    }

    fn plan(&self, filters: Option<&[RawFilterConfig]>) -> Result<ScanPlan, ScanError> {
        let strategy = Some(self.config.strategy);
        let limit = Some(self.config.limit);
        match filters {
            Some(filters) => self.coordinator.plan(filters, strategy, limit),
            None => {
                let defaults = self.default_filters.read().clone();
                self.coordinator.plan(&defaults, strategy, limit)
            }
        }
    }

    /// Current spread set of `symbol` under `profile`, for a session that
    /// just subscribed.
    ///
    /// Every spread is reported as added. Served from cache when fresh.
    pub async fn snapshot(&self, profile: &StreamProfile, symbol: &str) -> StreamEvent {
        let result = match self.plan(profile.filters()) {
            Ok(plan) => {
                self.coordinator
                    .scan_symbol(symbol, &plan, Priority::Low)
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(result) => StreamEvent::ScanUpdate {
                profile: profile.key.clone(),
                symbol: result.symbol.clone(),
                scan_time: result.scan_time,
                result_count: result.result_count,
                added: result.spreads.clone(),
                removed: Vec::new(),
            },
            Err(e) => StreamEvent::ScanError {
                profile: profile.key.clone(),
                symbol: symbol.to_string(),
                error: e.to_string(),
            },
        }
    }

    /// Rescans every subscribed (profile, symbol) pair once and broadcasts
    /// changes.
    ///
    /// Returns the number of events sent.
    pub async fn tick(&self) -> usize {
        let mut groups: BTreeMap<String, (Option<Vec<RawFilterConfig>>, Vec<String>)> =
            BTreeMap::new();
        for entry in self.subscriptions.iter() {
            if entry.value().sessions == 0 {
                continue;
            }
            let (profile, symbol) = entry.key();
            groups
                .entry(profile.clone())
                .or_insert_with(|| (entry.value().filters.clone(), Vec::new()))
                .1
                .push(symbol.clone());
        }

        let mut sent = 0;
        for (profile, (filters, mut symbols)) in groups {
            symbols.sort();
            let plan = match self.plan(filters.as_deref()) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!("Streaming profile {} skipped this round: {}", profile, e);
                    continue;
                }
            };
            sent += self.rescan(&profile, &symbols, &plan).await;
        }
        sent
    }

    async fn rescan(&self, profile: &str, symbols: &[String], plan: &ScanPlan) -> usize {
        let mut sent = 0;
        for scan in self.coordinator.scan_many(symbols, plan, Priority::Low).await {
            let event = match scan.result {
                Ok(result) => {
                    let current: HashSet<String> =
                        result.spreads.iter().map(|s| s.id.clone()).collect();
                    let previous = self
                        .last_ids
                        .insert((profile.to_string(), scan.symbol.clone()), current.clone());
                    if previous.as_ref() == Some(&current) {
                        continue;
                    }
                    let previous = previous.unwrap_or_default();

                    let added = result
                        .spreads
                        .iter()
                        .filter(|s| !previous.contains(&s.id))
                        .cloned()
                        .collect();
                    let mut removed: Vec<String> =
                        previous.difference(&current).cloned().collect();
                    removed.sort();

                    StreamEvent::ScanUpdate {
                        profile: profile.to_string(),
                        symbol: scan.symbol,
                        scan_time: result.scan_time,
                        result_count: result.result_count,
                        added,
                        removed,
                    }
                }
                Err(e) => StreamEvent::ScanError {
                    profile: profile.to_string(),
                    symbol: scan.symbol,
                    error: e.to_string(),
                },
            };

            // No receivers is fine; the next subscriber gets the next change.
            let _ = self.event_tx.send(event);
            sent += 1;
        }
        sent
    }

    /// Runs the rescan loop forever.
    pub async fn run(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Scan streaming disabled");
            return;
        }

        info!(
            "Starting scan streaming with {}ms interval",
            self.config.interval_ms
        );

        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let sent = self.tick().await;
            if sent > 0 {
                debug!("Streamed {} scan updates", sent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, ScannerConfig, SpreadConfig};
    use crate::metrics::Metrics;
    use crate::provider::SimulatedProvider;
    use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
    use std::time::Duration;

    fn streamer() -> ScanStreamer {
        let provider = ProviderConfig::default();
        let coordinator = Arc::new(ScanCoordinator::new(
            Arc::new(SimulatedProvider::new(
                provider.assets,
                provider.risk_free_rate,
                Duration::ZERO,
            )),
            Arc::new(RateLimiter::new(RateLimiterConfig::default())),
            ScannerConfig::default(),
            SpreadConfig::default(),
            Metrics::noop(),
        ));
        ScanStreamer::new(
            coordinator,
            Arc::new(RwLock::new(Vec::new())),
            StreamingConfig::default(),
        )
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn custom() -> StreamProfile {
        StreamProfile::new(Some(vec![RawFilterConfig::new(
            "dte",
            serde_json::json!({"min": 20, "max": 70}),
        )]))
        .unwrap()
    }

    #[test]
    fn test_subscription_counting() {
        let streamer = streamer();
        let default = StreamProfile::default();
        let (accepted, rejected) =
            streamer.subscribe(&default, &symbols(&["spy", "SPY", "bad sym"]));
        assert_eq!(accepted, vec!["SPY"]);
        assert_eq!(rejected, vec!["bad sym"]);

        streamer.subscribe(&default, &symbols(&["SPY"]));
        streamer.unsubscribe(&default, &symbols(&["spy"]));
        assert_eq!(streamer.subscribed_symbols(), vec!["SPY"]);

        streamer.unsubscribe(&default, &symbols(&["SPY"]));
        assert!(streamer.subscribed_symbols().is_empty());
    }

    #[test]
    fn test_profiles_are_counted_separately() {
        let streamer = streamer();
        streamer.subscribe(&StreamProfile::default(), &symbols(&["SPY"]));
        streamer.subscribe(&custom(), &symbols(&["SPY", "QQQ"]));
        assert_eq!(streamer.subscribed_symbols(), vec!["QQQ", "SPY"]);
        assert_eq!(streamer.active_profiles(), 2);

        // unsubscribing under the wrong profile leaves the other intact
        assert!(streamer.unsubscribe(&custom(), &symbols(&["IWM"])).is_empty());
        streamer.unsubscribe(&StreamProfile::default(), &symbols(&["SPY"]));
        assert_eq!(streamer.subscribed_symbols(), vec!["QQQ", "SPY"]);
        assert_eq!(streamer.active_profiles(), 1);
    }

    #[test]
    fn test_profile_keys() {
        assert_eq!(StreamProfile::default().key(), DEFAULT_PROFILE);
        assert!(StreamProfile::default().filters().is_none());

        let reordered = StreamProfile::new(Some(vec![
            RawFilterConfig::new("volume", serde_json::json!({"min": 5})),
            RawFilterConfig::new("dte", serde_json::json!({"min": 20, "max": 70})),
        ]))
        .unwrap();
        let again = StreamProfile::new(Some(vec![
            RawFilterConfig::new("dte", serde_json::json!({"max": 70, "min": 20})),
            RawFilterConfig::new("volume", serde_json::json!({"min": 5})),
        ]))
        .unwrap();
        assert_eq!(reordered.key(), again.key());
        assert_ne!(reordered.key(), custom().key());

        assert!(matches!(
            StreamProfile::new(Some(vec![RawFilterConfig::new("vibes", serde_json::json!({}))])),
            Err(ScanError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_tick_emits_only_on_change() {
        let streamer = streamer();
        let mut events = streamer.subscribe_events();
        streamer.subscribe(&StreamProfile::default(), &symbols(&["SPY", "BADSYM"]));

        assert_eq!(streamer.tick().await, 2);
        let mut saw_update = false;
        let mut saw_error = false;
        for _ in 0..2 {
            match events.recv().await.unwrap() {
                StreamEvent::ScanUpdate {
                    profile,
                    symbol,
                    added,
                    removed,
                    result_count,
                    ..
                } => {
                    assert_eq!(profile, DEFAULT_PROFILE);
                    assert_eq!(symbol, "SPY");
                    assert_eq!(added.len(), result_count);
                    assert!(removed.is_empty());
                    saw_update = true;
                }
                StreamEvent::ScanError { symbol, .. } => {
                    assert_eq!(symbol, "BADSYM");
                    saw_error = true;
                }
            }
        }
        assert!(saw_update && saw_error);

        // Cached, unchanged result: only the error is repeated.
        assert_eq!(streamer.tick().await, 1);
        assert!(matches!(
            events.recv().await.unwrap(),
            StreamEvent::ScanError { .. }
        ));
    }

    #[tokio::test]
    async fn test_tick_scans_each_profile() {
        let streamer = streamer();
        let mut events = streamer.subscribe_events();
        let custom = custom();
        streamer.subscribe(&StreamProfile::default(), &symbols(&["SPY"]));
        streamer.subscribe(&custom, &symbols(&["SPY"]));

        assert_eq!(streamer.tick().await, 2);
        let mut profiles = vec![
            events.recv().await.unwrap().profile().to_string(),
            events.recv().await.unwrap().profile().to_string(),
        ];
        profiles.sort();
        let mut expected = vec![DEFAULT_PROFILE.to_string(), custom.key().to_string()];
        expected.sort();
        assert_eq!(profiles, expected);
    }

    #[tokio::test]
    async fn test_snapshot_reports_full_set() {
        let streamer = streamer();
        match streamer.snapshot(&custom(), "qqq").await {
            StreamEvent::ScanUpdate {
                profile,
                symbol,
                added,
                removed,
                result_count,
                ..
            } => {
                assert_eq!(profile, custom().key());
                assert_eq!(symbol, "QQQ");
                assert_eq!(added.len(), result_count);
                assert!(removed.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            streamer.snapshot(&StreamProfile::default(), "BADSYM").await,
            StreamEvent::ScanError { .. }
        ));
    }

    #[tokio::test]
    async fn test_tick_without_subscriptions_does_nothing() {
        assert_eq!(streamer().tick().await, 0);
    }
}
