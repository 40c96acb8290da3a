//! Chains fetched from a market-data sidecar over HTTP.

use super::{FetchError, MarketDataProvider};
use crate::contract::OptionContract;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Provider calling `GET {base_url}/api/v1/options/{symbol}`.
///
/// The sidecar answers with a JSON array of contracts. Derived fields are
/// recomputed locally so the sidecar only needs to send quotes and greeks.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
}

impl HttpProvider {
    /// Creates a provider.
    ///
    /// # Arguments
    /// * `base_url` - Sidecar base URL, e.g. `http://market-data:8080`.
    /// * `timeout` - Per-request timeout.
    ///
    /// # Errors
    /// Returns [`FetchError::Connection`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_decode() {
        FetchError::Decode(error.to_string())
    } else if let Some(status) = error.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Connection(error.to_string())
    }
}

#[async_trait]
impl MarketDataProvider for HttpProvider {
    async fn fetch_chain(&self, symbol: &str) -> Result<Vec<OptionContract>, FetchError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let url = format!("{}/api/v1/options/{}", self.base_url, symbol);

        let resp = self.client.get(&url).send().await.map_err(classify)?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(FetchError::UnknownSymbol(symbol)),
            StatusCode::TOO_MANY_REQUESTS => return Err(FetchError::RateLimited),
            status => return Err(FetchError::Status(status.as_u16())),
        }

        let mut chain: Vec<OptionContract> = resp.json().await.map_err(classify)?;
        let today = Utc::now().date_naive();
        for contract in &mut chain {
            contract.refresh_derived(today);
        }

        debug!("Fetched {} contracts for {} from {}", chain.len(), symbol, self.base_url);
        Ok(chain)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;

    async fn options(Path(symbol): Path<String>) -> axum::response::Response {
        match symbol.as_str() {
            "AAPL" => axum::Json(serde_json::json!([{
                "underlying": "AAPL",
                "strike": 150.0,
                "expiration": "2030-01-18",
                "option_type": "call",
                "bid": 1.90,
                "ask": 2.10,
                "volume": 100,
                "open_interest": 400,
                "delta": 0.3
            }]))
            .into_response(),
            "BUSY" => AxumStatus::TOO_MANY_REQUESTS.into_response(),
            "DOWN" => AxumStatus::SERVICE_UNAVAILABLE.into_response(),
            "JUNK" => "not json".into_response(),
            _ => AxumStatus::NOT_FOUND.into_response(),
        }
    }

    async fn sidecar() -> String {
        let app = Router::new().route("/api/v1/options/{symbol}", get(options));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_fetch_populates_derived_fields() {
        let provider = HttpProvider::new(&sidecar().await, Duration::from_secs(5)).unwrap();
        let chain = provider.fetch_chain("aapl").await.unwrap();

        assert_eq!(chain.len(), 1);
        assert!((chain[0].bid_ask_spread - 0.20).abs() < 1e-9);
        assert!((chain[0].liquidity - 200.0).abs() < 1e-9);
        assert!(chain[0].dte > 0);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let provider = HttpProvider::new(&sidecar().await, Duration::from_secs(5)).unwrap();

        assert_eq!(
            provider.fetch_chain("NOPE").await.unwrap_err(),
            FetchError::UnknownSymbol("NOPE".to_string())
        );
        assert_eq!(provider.fetch_chain("BUSY").await.unwrap_err(), FetchError::RateLimited);
        assert_eq!(provider.fetch_chain("DOWN").await.unwrap_err(), FetchError::Status(503));
        assert!(matches!(
            provider.fetch_chain("JUNK").await.unwrap_err(),
            FetchError::Decode(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_is_retryable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider =
            HttpProvider::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = provider.fetch_chain("AAPL").await.unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
