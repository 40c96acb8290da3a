//! Scan instrumentation.
//!
//! Components record through a [`Metrics`] handle wrapping an injected
//! [`MetricsSink`]. Recording is fire-and-forget: sink errors are logged at
//! debug level and dropped, so instrumentation can never fail a scan.
//! [`ScannerMetrics`] is the in-process sink backing the statistics endpoint
//! and, through `metrics-exporter-prometheus`, the Prometheus exposition.

use crate::filters::FilterStat;
use dashmap::DashMap;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Histogram of single-symbol scan latency.
const SCAN_DURATION: &str = "scanner_scan_duration_seconds";

/// Scan duration histogram bucket upper bounds, in seconds.
const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Metrics backend errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    /// The backend could not record the sample.
    #[error("metrics backend unavailable: {0}")]
    Unavailable(String),
}

/// How a single-symbol scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanOutcome {
    /// Result produced (fresh or cached).
    Success,
    /// Upstream fetch failed after retries.
    UpstreamError,
    /// Deadline exceeded.
    Timeout,
    /// The single-flight owner went away.
    Aborted,
}

impl ScanOutcome {
    /// Label value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::UpstreamError => "upstream_error",
            Self::Timeout => "timeout",
            Self::Aborted => "aborted",
        }
    }
}

/// One completed single-symbol scan.
#[derive(Debug, Clone)]
pub struct ScanEvent<'a> {
    /// Scanned symbol.
    pub symbol: &'a str,
    /// How it ended.
    pub outcome: ScanOutcome,
    /// Wall time including waits.
    pub duration: Duration,
    /// Served from cache or from another caller's in-flight fetch.
    pub shared: bool,
    /// Contracts fed into the filter chain (0 when shared).
    pub contracts_in: usize,
    /// Contracts that survived the chain (0 when shared).
    pub contracts_out: usize,
}

/// Destination for scan instrumentation.
pub trait MetricsSink: Send + Sync {
    /// Records a finished scan.
    fn record_scan(&self, event: &ScanEvent<'_>) -> Result<(), MetricsError>;

    /// Records pass counts of one filter in one chain evaluation.
    fn record_filter(&self, stat: &FilterStat) -> Result<(), MetricsError>;

    /// Records a cache hit.
    fn record_cache_hit(&self) -> Result<(), MetricsError>;

    /// Records a cache miss.
    fn record_cache_miss(&self) -> Result<(), MetricsError>;

    /// Records how many spread candidates a fresh scan produced.
    fn record_spreads_found(&self, symbol: &str, count: usize) -> Result<(), MetricsError>;

    /// Records an upstream fetch attempt.
    fn record_upstream_fetch(
        &self,
        symbol: &str,
        contracts: usize,
        success: bool,
    ) -> Result<(), MetricsError>;

    /// Records a served HTTP request.
    fn record_http_request(&self, _method: &str, _status: u16) -> Result<(), MetricsError> {
        Ok(())
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record_scan(&self, _event: &ScanEvent<'_>) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_filter(&self, _stat: &FilterStat) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_cache_hit(&self) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_cache_miss(&self) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_spreads_found(&self, _symbol: &str, _count: usize) -> Result<(), MetricsError> {
        Ok(())
    }

    fn record_upstream_fetch(
        &self,
        _symbol: &str,
        _contracts: usize,
        _success: bool,
    ) -> Result<(), MetricsError> {
        Ok(())
    }
}

/// Fire-and-forget recording handle.
#[derive(Clone)]
pub struct Metrics {
    sink: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Wraps a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    /// Handle that records nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    /// Records a finished scan.
    pub fn scan(&self, event: &ScanEvent<'_>) {
        swallow(self.sink.record_scan(event));
    }

    /// Records per-filter counts.
    pub fn filter(&self, stat: &FilterStat) {
        swallow(self.sink.record_filter(stat));
    }

    /// Records a cache hit.
    pub fn cache_hit(&self) {
        swallow(self.sink.record_cache_hit());
    }

    /// Records a cache miss.
    pub fn cache_miss(&self) {
        swallow(self.sink.record_cache_miss());
    }

    /// Records spreads found.
    pub fn spreads_found(&self, symbol: &str, count: usize) {
        swallow(self.sink.record_spreads_found(symbol, count));
    }

    /// Records an upstream fetch attempt.
    pub fn upstream_fetch(&self, symbol: &str, contracts: usize, success: bool) {
        swallow(self.sink.record_upstream_fetch(symbol, contracts, success));
    }

    /// Records a served HTTP request.
    pub fn http_request(&self, method: &str, status: u16) {
        swallow(self.sink.record_http_request(method, status));
    }
}

fn swallow(result: Result<(), MetricsError>) {
    if let Err(e) = result {
        debug!("Dropping metrics sample: {}", e);
    }
}

#[derive(Debug, Default)]
struct FilterCounters {
    evaluated: AtomicU64,
    passed: AtomicU64,
}

/// Per-filter aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStatistics {
    /// Filter kind.
    pub kind: String,
    /// Contracts evaluated.
    pub evaluated: u64,
    /// Contracts passed.
    pub passed: u64,
    /// `passed / evaluated`, 1.0 when nothing was evaluated.
    pub pass_rate: f64,
}

/// Aggregate counters.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsSnapshot {
    /// Scans of any outcome.
    pub total_scans: u64,
    /// Successful scans.
    pub successful_scans: u64,
    /// Scans that failed upstream or were aborted.
    pub failed_scans: u64,
    /// Scans that hit their deadline.
    pub timed_out_scans: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// `hits / (hits + misses)`.
    pub cache_hit_ratio: f64,
    /// Upstream fetch attempts.
    pub upstream_fetches: u64,
    /// Failed upstream fetch attempts.
    pub upstream_failures: u64,
    /// Contracts fed into filter chains.
    pub contracts_evaluated: u64,
    /// Contracts that survived filter chains.
    pub contracts_passed: u64,
    /// `1 - passed / evaluated` over all fresh scans.
    pub average_filter_reduction: f64,
    /// Mean scan latency in milliseconds.
    pub average_scan_ms: f64,
    /// Spread candidates produced.
    pub spreads_found: u64,
    /// Per-filter aggregates sorted by kind.
    pub filters: Vec<FilterStatistics>,
    /// Seconds since the registry was created.
    pub uptime_secs: u64,
}

/// Extra gauge rendered alongside the registry's own series.
#[derive(Debug, Clone, Copy)]
pub struct Gauge {
    /// Metric name.
    pub name: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Current value.
    pub value: f64,
}

/// Label value for an HTTP method. Extension methods collapse into `OTHER`.
#[must_use]
pub fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        "PATCH" => "PATCH",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        "CONNECT" => "CONNECT",
        "TRACE" => "TRACE",
        _ => "OTHER",
    }
}

/// In-process metrics registry.
///
/// Aggregates for the statistics endpoint live in atomics; every sample is
/// also recorded into a private Prometheus recorder that backs `/metrics`.
/// The recorder is never installed globally, so independent registries (one
/// per server, one per test) never share series.
pub struct ScannerMetrics {
    started: Instant,
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    scans_success: AtomicU64,
    scans_upstream_error: AtomicU64,
    scans_timeout: AtomicU64,
    scans_aborted: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_fetches: AtomicU64,
    upstream_failures: AtomicU64,
    contracts_evaluated: AtomicU64,
    contracts_passed: AtomicU64,
    spreads_found: AtomicU64,
    scan_count: AtomicU64,
    scan_micros: AtomicU64,
    filters: DashMap<&'static str, FilterCounters>,
}

impl std::fmt::Debug for ScannerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerMetrics")
            .field("uptime", &self.started.elapsed())
            .finish_non_exhaustive()
    }
}

impl Default for ScannerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerMetrics {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let builder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Full(SCAN_DURATION.to_string()),
            &DURATION_BUCKETS,
        ) {
            Ok(builder) => builder,
            Err(e) => {
                warn!("Scan duration buckets rejected, exporting a summary: {}", e);
                PrometheusBuilder::new()
            }
        };
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!("scanner_scans_total", "Single-symbol scans by outcome.");
            describe_counter!("scanner_cache_hits_total", "Scan cache hits.");
            describe_counter!("scanner_cache_misses_total", "Scan cache misses.");
            describe_counter!("scanner_upstream_fetches_total", "Upstream chain fetch attempts.");
            describe_counter!(
                "scanner_upstream_failures_total",
                "Failed upstream chain fetch attempts."
            );
            describe_counter!(
                "scanner_contracts_fetched_total",
                "Contracts received from upstream."
            );
            describe_counter!("scanner_spreads_found_total", "Spread candidates produced.");
            describe_counter!(
                "scanner_filter_evaluated_total",
                "Rows evaluated per filter kind."
            );
            describe_counter!("scanner_filter_passed_total", "Rows passed per filter kind.");
            describe_counter!(
                "scanner_http_requests_total",
                "HTTP requests by method and status."
            );
            describe_histogram!(SCAN_DURATION, "Single-symbol scan latency in seconds.");
        });

        Self {
            started: Instant::now(),
            recorder,
            handle,
            scans_success: AtomicU64::new(0),
            scans_upstream_error: AtomicU64::new(0),
            scans_timeout: AtomicU64::new(0),
            scans_aborted: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            upstream_fetches: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            contracts_evaluated: AtomicU64::new(0),
            contracts_passed: AtomicU64::new(0),
            spreads_found: AtomicU64::new(0),
            scan_count: AtomicU64::new(0),
            scan_micros: AtomicU64::new(0),
            filters: DashMap::new(),
        }
    }

    /// Runs `f` with this registry's recorder as the active one.
    fn emit(&self, f: impl FnOnce()) {
        metrics::with_local_recorder(&self.recorder, f);
    }

    /// Upstream fetch attempts so far.
    #[must_use]
    pub fn upstream_fetches(&self) -> u64 {
        self.upstream_fetches.load(Ordering::Relaxed)
    }

    /// Aggregates all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        let successful = load(&self.scans_success);
        let failed = load(&self.scans_upstream_error) + load(&self.scans_aborted);
        let timed_out = load(&self.scans_timeout);
        let hits = load(&self.cache_hits);
        let misses = load(&self.cache_misses);
        let evaluated = load(&self.contracts_evaluated);
        let passed = load(&self.contracts_passed);
        let duration_count = load(&self.scan_count);

        let mut filters: Vec<FilterStatistics> = self
            .filters
            .iter()
            .map(|entry| {
                let evaluated = load(&entry.value().evaluated);
                let passed = load(&entry.value().passed);
                FilterStatistics {
                    kind: (*entry.key()).to_string(),
                    evaluated,
                    passed,
                    pass_rate: ratio(passed, evaluated, 1.0),
                }
            })
            .collect();
        filters.sort_by(|a, b| a.kind.cmp(&b.kind));

        StatisticsSnapshot {
            total_scans: successful + failed + timed_out,
            successful_scans: successful,
            failed_scans: failed,
            timed_out_scans: timed_out,
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_ratio: ratio(hits, hits + misses, 0.0),
            upstream_fetches: load(&self.upstream_fetches),
            upstream_failures: load(&self.upstream_failures),
            contracts_evaluated: evaluated,
            contracts_passed: passed,
            average_filter_reduction: if evaluated == 0 {
                0.0
            } else {
                1.0 - ratio(passed, evaluated, 1.0)
            },
            average_scan_ms: if duration_count == 0 {
                0.0
            } else {
                load(&self.scan_micros) as f64 / duration_count as f64 / 1_000.0
            },
            spreads_found: load(&self.spreads_found),
            filters,
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }

    /// Renders every series in Prometheus text exposition format.
    ///
    /// `gauges` are point-in-time values owned by other components (cache
    /// size, limiter tokens) and are set just before rendering.
    #[must_use]
    pub fn render_prometheus(&self, gauges: &[Gauge]) -> String {
        self.emit(|| {
            for gauge in gauges {
                describe_gauge!(gauge.name, gauge.help);
                gauge!(gauge.name).set(gauge.value);
            }
        });
        self.handle.render()
    }

    /// Drains histogram samples into their buckets.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    /// Runs [`ScannerMetrics::run_upkeep`] every `period`.
    pub fn spawn_upkeep(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                metrics.run_upkeep();
            }
        })
    }
}

fn ratio(numerator: u64, denominator: u64, empty: f64) -> f64 {
    if denominator == 0 {
        empty
    } else {
        numerator as f64 / denominator as f64
    }
}

impl MetricsSink for ScannerMetrics {
    fn record_scan(&self, event: &ScanEvent<'_>) -> Result<(), MetricsError> {
        let counter = match event.outcome {
            ScanOutcome::Success => &self.scans_success,
            ScanOutcome::UpstreamError => &self.scans_upstream_error,
            ScanOutcome::Timeout => &self.scans_timeout,
            ScanOutcome::Aborted => &self.scans_aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.scan_count.fetch_add(1, Ordering::Relaxed);
        self.scan_micros
            .fetch_add(event.duration.as_micros() as u64, Ordering::Relaxed);

        if !event.shared {
            self.contracts_evaluated
                .fetch_add(event.contracts_in as u64, Ordering::Relaxed);
            self.contracts_passed
                .fetch_add(event.contracts_out as u64, Ordering::Relaxed);
        }

        self.emit(|| {
            counter!("scanner_scans_total", "outcome" => event.outcome.as_str()).increment(1);
            histogram!(SCAN_DURATION).record(event.duration.as_secs_f64());
        });
        Ok(())
    }

    fn record_filter(&self, stat: &FilterStat) -> Result<(), MetricsError> {
        let entry = self.filters.entry(stat.kind).or_default();
        entry
            .evaluated
            .fetch_add(stat.evaluated as u64, Ordering::Relaxed);
        entry.passed.fetch_add(stat.passed as u64, Ordering::Relaxed);
        drop(entry);

        self.emit(|| {
            counter!("scanner_filter_evaluated_total", "filter" => stat.kind)
                .increment(stat.evaluated as u64);
            counter!("scanner_filter_passed_total", "filter" => stat.kind)
                .increment(stat.passed as u64);
        });
        Ok(())
    }

    fn record_cache_hit(&self) -> Result<(), MetricsError> {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.emit(|| counter!("scanner_cache_hits_total").increment(1));
        Ok(())
    }

    fn record_cache_miss(&self) -> Result<(), MetricsError> {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.emit(|| counter!("scanner_cache_misses_total").increment(1));
        Ok(())
    }

    fn record_spreads_found(&self, _symbol: &str, count: usize) -> Result<(), MetricsError> {
        self.spreads_found.fetch_add(count as u64, Ordering::Relaxed);
        self.emit(|| counter!("scanner_spreads_found_total").increment(count as u64));
        Ok(())
    }

    fn record_upstream_fetch(
        &self,
        _symbol: &str,
        contracts: usize,
        success: bool,
    ) -> Result<(), MetricsError> {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.upstream_failures.fetch_add(1, Ordering::Relaxed);
        }

        self.emit(|| {
            counter!("scanner_upstream_fetches_total").increment(1);
            if success {
                counter!("scanner_contracts_fetched_total").increment(contracts as u64);
            } else {
                counter!("scanner_upstream_failures_total").increment(1);
            }
        });
        Ok(())
    }

    fn record_http_request(&self, method: &str, status: u16) -> Result<(), MetricsError> {
        let method = method_label(method);
        self.emit(|| {
            counter!(
                "scanner_http_requests_total",
                "method" => method,
                "status" => status.to_string()
            )
            .increment(1);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl MetricsSink for BrokenSink {
        fn record_scan(&self, _event: &ScanEvent<'_>) -> Result<(), MetricsError> {
            Err(MetricsError::Unavailable("down".to_string()))
        }
        fn record_filter(&self, _stat: &FilterStat) -> Result<(), MetricsError> {
            Err(MetricsError::Unavailable("down".to_string()))
        }
        fn record_cache_hit(&self) -> Result<(), MetricsError> {
            Err(MetricsError::Unavailable("down".to_string()))
        }
        fn record_cache_miss(&self) -> Result<(), MetricsError> {
            Err(MetricsError::Unavailable("down".to_string()))
        }
        fn record_spreads_found(&self, _: &str, _: usize) -> Result<(), MetricsError> {
            Err(MetricsError::Unavailable("down".to_string()))
        }
        fn record_upstream_fetch(&self, _: &str, _: usize, _: bool) -> Result<(), MetricsError> {
            Err(MetricsError::Unavailable("down".to_string()))
        }
    }

    fn event(outcome: ScanOutcome, millis: u64, shared: bool) -> ScanEvent<'static> {
        ScanEvent {
            symbol: "AAPL",
            outcome,
            duration: Duration::from_millis(millis),
            shared,
            contracts_in: 100,
            contracts_out: 25,
        }
    }

    #[test]
    fn test_broken_sink_is_swallowed() {
        let metrics = Metrics::new(Arc::new(BrokenSink));
        metrics.scan(&event(ScanOutcome::Success, 5, false));
        metrics.cache_hit();
        metrics.cache_miss();
        metrics.spreads_found("AAPL", 3);
        metrics.upstream_fetch("AAPL", 10, true);
        metrics.http_request("GET", 200);
    }

    #[test]
    fn test_snapshot_aggregates() {
        let registry = ScannerMetrics::new();
        registry.record_scan(&event(ScanOutcome::Success, 10, false)).unwrap();
        registry.record_scan(&event(ScanOutcome::Success, 30, true)).unwrap();
        registry.record_scan(&event(ScanOutcome::Timeout, 50, false)).unwrap();
        registry.record_cache_hit().unwrap();
        registry.record_cache_miss().unwrap();
        registry.record_cache_miss().unwrap();
        registry.record_cache_miss().unwrap();
        registry.record_spreads_found("AAPL", 7).unwrap();
        registry.record_upstream_fetch("AAPL", 40, true).unwrap();
        registry.record_upstream_fetch("AAPL", 0, false).unwrap();

        let snap = registry.snapshot();
        assert_eq!(snap.total_scans, 3);
        assert_eq!(snap.successful_scans, 2);
        assert_eq!(snap.timed_out_scans, 1);
        assert!((snap.cache_hit_ratio - 0.25).abs() < 1e-9);
        assert_eq!(snap.contracts_evaluated, 200);
        assert_eq!(snap.contracts_passed, 50);
        assert!((snap.average_filter_reduction - 0.75).abs() < 1e-9);
        assert!((snap.average_scan_ms - 30.0).abs() < 1e-6);
        assert_eq!(snap.spreads_found, 7);
        assert_eq!(snap.upstream_fetches, 2);
        assert_eq!(snap.upstream_failures, 1);
    }

    #[test]
    fn test_filter_statistics() {
        let registry = ScannerMetrics::new();
        let stat = FilterStat {
            kind: "delta",
            position: 0,
            evaluated: 10,
            passed: 4,
        };
        registry.record_filter(&stat).unwrap();
        registry.record_filter(&stat).unwrap();

        let snap = registry.snapshot();
        assert_eq!(snap.filters.len(), 1);
        assert_eq!(snap.filters[0].kind, "delta");
        assert_eq!(snap.filters[0].evaluated, 20);
        assert!((snap.filters[0].pass_rate - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot_has_no_nan() {
        let snap = ScannerMetrics::new().snapshot();
        assert_eq!(snap.cache_hit_ratio, 0.0);
        assert_eq!(snap.average_filter_reduction, 0.0);
        assert_eq!(snap.average_scan_ms, 0.0);
    }

    #[test]
    fn test_prometheus_exposition() {
        let registry = ScannerMetrics::new();
        registry.record_scan(&event(ScanOutcome::Success, 20, false)).unwrap();
        registry.record_cache_miss().unwrap();
        registry.record_http_request("GET", 200).unwrap();
        registry.run_upkeep();

        let text = registry.render_prometheus(&[Gauge {
            name: "scanner_cache_entries",
            help: "Live cache entries.",
            value: 2.0,
        }]);

        assert!(text.contains("# TYPE scanner_scans_total counter"));
        assert!(text.contains("scanner_scans_total{outcome=\"success\"} 1"));
        assert!(text.contains("scanner_cache_misses_total 1"));
        assert!(text.contains("scanner_http_requests_total{method=\"GET\",status=\"200\"} 1"));
        assert!(text.contains("scanner_scan_duration_seconds_bucket{le=\"+Inf\"} 1"));
        assert!(text.contains("scanner_scan_duration_seconds_count 1"));
        assert!(text.contains("# HELP scanner_cache_entries Live cache entries."));
        assert!(text.lines().any(|l| l.starts_with("scanner_cache_entries ")));
    }

    #[test]
    fn test_registries_are_isolated() {
        let first = ScannerMetrics::new();
        let second = ScannerMetrics::new();
        first.record_cache_hit().unwrap();

        assert!(first.render_prometheus(&[]).contains("scanner_cache_hits_total 1"));
        assert!(!second.render_prometheus(&[]).contains("scanner_cache_hits_total 1"));
    }

    #[test]
    fn test_method_label() {
        assert_eq!(method_label("GET"), "GET");
        assert_eq!(method_label("OPTIONS"), "OPTIONS");
        assert_eq!(method_label("PROPFIND"), "OTHER");
        assert_eq!(method_label("get"), "OTHER");
    }

    #[test]
    fn test_extension_methods_share_one_series() {
        let registry = ScannerMetrics::new();
        registry.record_http_request("PROPFIND", 405).unwrap();
        registry.record_http_request("X-CUSTOM-1", 405).unwrap();
        registry.record_http_request("X-CUSTOM-2", 405).unwrap();

        let text = registry.render_prometheus(&[]);
        assert!(text.contains("scanner_http_requests_total{method=\"OTHER\",status=\"405\"} 3"));
        assert!(!text.contains("PROPFIND"));
    }
}
