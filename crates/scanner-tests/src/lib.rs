//! Integration tests for the Option Chain Scanner API.
//!
//! Each test boots the server in-process on an ephemeral port, backed by the
//! simulated market-data provider, and drives it through `scanner-client`.

use option_chain_scanner_backend::api::create_router;
use option_chain_scanner_backend::config::Config;
use option_chain_scanner_backend::provider;
use option_chain_scanner_backend::state::AppState;
use scanner_client::{ClientConfig, ScannerClient, WsClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server running on `127.0.0.1` for the lifetime of the value.
pub struct TestServer {
    /// `http://127.0.0.1:{port}`.
    pub base_url: String,
    /// Shared state, for assertions that bypass HTTP.
    pub state: Arc<AppState>,
    tasks: Vec<JoinHandle<()>>,
}

impl TestServer {
    /// Creates a client for this server.
    ///
    /// # Errors
    /// Returns error if client creation fails.
    pub fn client(&self) -> Result<ScannerClient, scanner_client::Error> {
        ScannerClient::new(ClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(10),
        })
    }

    /// Opens a WebSocket session.
    ///
    /// # Errors
    /// Returns error if the connection fails.
    pub async fn ws(&self) -> Result<WsClient, scanner_client::Error> {
        WsClient::connect_to_base(&self.base_url).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Configuration tuned for fast tests: no simulated latency, quick
/// streaming and heartbeats.
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.provider.latency_ms = 0;
    config.streaming.interval_ms = 200;
    config.streaming.heartbeat_secs = 1;
    config
}

/// Boots a server with [`test_config`].
///
/// # Errors
/// Returns error if the listener cannot bind.
pub async fn spawn_server() -> std::io::Result<TestServer> {
    spawn_server_with(test_config()).await
}

/// Boots a server with `config`.
///
/// # Errors
/// Returns error if the provider cannot be built or the listener cannot bind.
pub async fn spawn_server_with(config: Config) -> std::io::Result<TestServer> {
    let provider = provider::from_config(&config.provider)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let state = Arc::new(AppState::new(config, provider));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = create_router(Arc::clone(&state));

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let streamer = tokio::spawn(Arc::clone(&state.streamer).run());
    let sweeper = state.coordinator.spawn_cache_sweeper();
    let upkeep = state.metrics.spawn_upkeep(Duration::from_secs(1));

    Ok(TestServer {
        base_url: format!("http://{}", addr),
        state,
        tasks: vec![server, streamer, sweeper, upkeep],
    })
}
