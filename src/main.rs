//! Option Chain Scanner Backend Server
//!
//! REST and WebSocket server for option chain scans.

use option_chain_scanner_backend::api::create_router;
use option_chain_scanner_backend::config::Config;
use option_chain_scanner_backend::provider;
use option_chain_scanner_backend::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use option_chain_scanner_backend::contract::{OptionContract, OptionType};
use option_chain_scanner_backend::error::ErrorResponse;
use option_chain_scanner_backend::filters::RawFilterConfig;
use option_chain_scanner_backend::models::{
    BatchScanResponse, CacheInvalidationResponse, FilterStatisticsResponse,
    FilterValidationResponse, FiltersRequest, FiltersResponse, HealthResponse, PresetsResponse,
    ScanRequest, StatisticsResponse, SymbolScanResponse,
};
use option_chain_scanner_backend::presets::{FilterPreset, PresetInput, PresetUpdate};
use option_chain_scanner_backend::scanner::{ScanResult, SpreadCandidate, SpreadStrategy};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        option_chain_scanner_backend::api::handlers::health_check,
        option_chain_scanner_backend::api::handlers::scan_symbol,
        option_chain_scanner_backend::api::handlers::scan_batch,
        option_chain_scanner_backend::api::handlers::get_filters,
        option_chain_scanner_backend::api::handlers::update_filters,
        option_chain_scanner_backend::api::handlers::validate_filters,
        option_chain_scanner_backend::api::handlers::list_presets,
        option_chain_scanner_backend::api::handlers::create_preset,
        option_chain_scanner_backend::api::handlers::get_preset,
        option_chain_scanner_backend::api::handlers::update_preset,
        option_chain_scanner_backend::api::handlers::delete_preset,
        option_chain_scanner_backend::api::handlers::clear_cache,
        option_chain_scanner_backend::api::handlers::invalidate_symbol,
        option_chain_scanner_backend::api::handlers::get_statistics,
        option_chain_scanner_backend::api::handlers::get_metrics,
        option_chain_scanner_backend::api::websocket::ws_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            OptionType,
            OptionContract,
            SpreadStrategy,
            SpreadCandidate,
            ScanResult,
            ScanRequest,
            SymbolScanResponse,
            BatchScanResponse,
            RawFilterConfig,
            FiltersRequest,
            FiltersResponse,
            FilterValidationResponse,
            FilterPreset,
            PresetInput,
            PresetUpdate,
            PresetsResponse,
            CacheInvalidationResponse,
            FilterStatisticsResponse,
            StatisticsResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Scans", description = "Option chain and spread scans"),
        (name = "Filters", description = "Default filters and filter presets"),
        (name = "Cache", description = "Scan cache management"),
        (name = "Statistics", description = "Aggregate statistics and metrics"),
        (name = "WebSocket", description = "Live scan updates"),
    ),
    info(
        title = "Option Chain Scanner API",
        version = "0.1.0",
        description = "REST API for scanning option chains and ranking vertical spreads",
        license(name = "MIT"),
        contact(name = "Joaquin Bejar", email = "jb@taunais.com")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    let provider = provider::from_config(&config.provider)?;
    info!("Using {} market-data provider", provider.name());

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, provider));

    // Background tasks
    state.coordinator.spawn_cache_sweeper();
    state.metrics.spawn_upkeep(Duration::from_secs(5));
    tokio::spawn(Arc::clone(&state.streamer).run());

    info!("Starting Option Chain Scanner Backend on {}:{}", host, port);
    info!(
        "Swagger UI available at http://{}:{}/swagger-ui/",
        host, port
    );

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = create_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start the server
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
