//! # Option Chain Scanner Backend
//!
//! A REST and WebSocket service that scans option chains for contracts and
//! vertical spreads matching a configurable filter chain. Built with
//! [Axum](https://crates.io/crates/axum) for async HTTP handling and
//! documented via [utoipa](https://crates.io/crates/utoipa).
//!
//! ## Key Features
//!
//! - **Filter Chains**: Ordered, conjunctive filters (delta, DTE, volume, open
//!   interest, IV, IV percentile, theta, vega, bid-ask spread, option type,
//!   liquidity, spread probability of profit and width) parsed and validated
//!   once into closed typed variants. Named presets bundle common chains.
//!
//! - **Admission Control**: A priority-aware token bucket sized below the
//!   upstream provider's documented rate limit.
//!
//! - **Single-Flight Caching**: Identical scans within the TTL share one
//!   upstream fetch; concurrent duplicates wait on the in-flight owner.
//!
//! - **Spread Ranking**: Debit and credit verticals scored by risk/reward and
//!   probability of profit.
//!
//! - **Live Streaming**: WebSocket sessions receive spread deltas for the
//!   symbols they subscribe to.
//!
//! - **Observability**: Aggregate statistics and Prometheus exposition.
//!
//! ## Architecture
//!
//! ```text
//! request ──► ScanCoordinator ──► ScanCache ──hit──► ScanResult
//!                   │ miss
//!                   ▼
//!             single-flight ──► RateLimiter ──► MarketDataProvider
//!                   │
//!                   ▼
//!             FilterChain ──► SpreadConstructor ──► ScanResult (cached)
//! ```
//!
//! ## Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Route handlers, middleware and router configuration |
//! | [`cache`] | TTL cache of scan results |
//! | [`config`] | TOML configuration |
//! | [`contract`] | Option contract model |
//! | [`error`] | API error types with `IntoResponse` implementation |
//! | [`filters`] | Filter configuration and chains |
//! | [`metrics`] | Metrics sink and registry |
//! | [`models`] | Request/response DTOs with OpenAPI schemas |
//! | [`presets`] | Named filter presets |
//! | [`provider`] | Market-data providers |
//! | [`rate_limiter`] | Token bucket |
//! | [`scanner`] | Scan coordinator and spread construction |
//! | [`state`] | Application state management |
//! | [`streaming`] | Periodic rescans for WebSocket subscribers |
//!
//! ## API Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/scan/{symbol}` | Scan one symbol |
//! | POST | `/scan` | Scan several symbols |
//! | GET | `/filters` | Default filter configuration |
//! | PUT | `/filters` | Replace the default filters |
//! | POST | `/api/v1/filters/validate` | Validate filters without storing |
//! | GET, POST | `/api/v1/filters/presets` | List or create filter presets |
//! | GET, PUT, DELETE | `/api/v1/filters/presets/{id}` | Read, modify or remove a preset |
//! | DELETE | `/api/v1/cache` | Clear the scan cache |
//! | DELETE | `/api/v1/cache/{symbol}` | Invalidate one symbol |
//! | GET | `/analytics/statistics` | Aggregate statistics |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/ws` | Live scan updates |
//!
//! ## Example Usage
//!
//! ```bash
//! # Development mode with the simulated provider
//! cargo run
//!
//! # Custom configuration file and port
//! CONFIG_PATH=config.toml PORT=3000 cargo run
//!
//! # Credit spreads on SPY between 30 and 60 DTE
//! curl 'http://localhost:8080/scan/SPY?strategy=credit&limit=10&filters=[{"type":"dte","params":{"min":30,"max":60}}]'
//!
//! # Batch scan
//! curl -X POST http://localhost:8080/scan \
//!   -H "Content-Type: application/json" \
//!   -d '{"symbols": ["AAPL", "MSFT"], "maxResults": 5}'
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod contract;
pub mod error;
pub mod filters;
pub mod metrics;
pub mod models;
pub mod presets;
pub mod provider;
pub mod rate_limiter;
pub mod scanner;
pub mod state;
pub mod streaming;
