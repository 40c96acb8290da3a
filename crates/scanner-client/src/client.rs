//! HTTP client for the scanner API.

use crate::error::Error;
use crate::types::*;
use reqwest::Client;
use std::time::Duration;

#[cfg(test)]
mod tests;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API (e.g., "http://localhost:8080").
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for the Option Chain Scanner API.
#[derive(Debug, Clone)]
pub struct ScannerClient {
    client: Client,
    base_url: String,
}

impl ScannerClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Creates a new client with default configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::new(ClientConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Performs a health check.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn health_check(&self) -> Result<HealthResponse, Error> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// Scans one symbol.
    ///
    /// # Arguments
    /// * `symbol` - Underlying symbol.
    /// * `filters` - Filter chain; the server defaults apply when `None`.
    /// * `strategy` - Spread strategy; `None` returns options only.
    /// * `limit` - Maximum rows.
    ///
    /// # Errors
    /// Returns error if the request fails or the scan fails.
    pub async fn scan_symbol(
        &self,
        symbol: &str,
        filters: Option<&[FilterConfig]>,
        strategy: Option<SpreadStrategy>,
        limit: Option<usize>,
    ) -> Result<ScanResult, Error> {
        let query = ScanQuery {
            filters: filters.map(serde_json::to_string).transpose()?,
            strategy,
            limit,
        };
        let mut url = format!("{}/scan/{}", self.base_url, symbol);
        let params = serde_urlencoded::to_string(&query)?;
        if !params.is_empty() {
            url.push_str(&format!("?{}", params));
        }
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Scans several symbols.
    ///
    /// # Errors
    /// Returns error if the request is rejected as a whole.
    pub async fn scan_batch(&self, request: &ScanRequest) -> Result<BatchScanResponse, Error> {
        let url = format!("{}/scan", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Filters
    // ========================================================================

    /// Gets the default filters.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_filters(&self) -> Result<FiltersResponse, Error> {
        let url = format!("{}/filters", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Replaces the default filters.
    ///
    /// # Errors
    /// Returns error if the request fails or the filters are invalid.
    pub async fn update_filters(&self, filters: Vec<FilterConfig>) -> Result<FiltersResponse, Error> {
        let url = format!("{}/filters", self.base_url);
        let resp = self
            .client
            .put(&url)
            .json(&FiltersRequest { filters })
            .send()
            .await?;
        self.handle_response(resp).await
    }

    /// Validates filters without storing them.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn validate_filters(
        &self,
        filters: Vec<FilterConfig>,
    ) -> Result<FilterValidationResponse, Error> {
        let url = format!("{}/api/v1/filters/validate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&FiltersRequest { filters })
            .send()
            .await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Filter Presets
    // ========================================================================

    /// Lists filter presets.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn list_presets(&self) -> Result<PresetsResponse, Error> {
        let url = format!("{}/api/v1/filters/presets", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Creates a filter preset.
    ///
    /// # Errors
    /// Returns error if the request fails, the name is blank or the filters are invalid.
    pub async fn create_preset(&self, request: &PresetRequest) -> Result<FilterPreset, Error> {
        let url = format!("{}/api/v1/filters/presets", self.base_url);
        let resp = self.client.post(&url).json(request).send().await?;
        self.handle_response(resp).await
    }

    /// Gets a filter preset.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown ids.
    pub async fn get_preset(&self, id: &str) -> Result<FilterPreset, Error> {
        let url = format!("{}/api/v1/filters/presets/{}", self.base_url, id);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Modifies a filter preset.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown ids.
    pub async fn update_preset(&self, id: &str, update: &PresetUpdate) -> Result<FilterPreset, Error> {
        let url = format!("{}/api/v1/filters/presets/{}", self.base_url, id);
        let resp = self.client.put(&url).json(update).send().await?;
        self.handle_response(resp).await
    }

    /// Deletes a filter preset.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for unknown ids.
    pub async fn delete_preset(&self, id: &str) -> Result<(), Error> {
        let url = format!("{}/api/v1/filters/presets/{}", self.base_url, id);
        let resp = self.client.delete(&url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::error_from(status.as_u16(), resp.text().await.unwrap_or_default()))
        }
    }

    // ========================================================================
    // Cache
    // ========================================================================

    /// Clears the scan cache.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn clear_cache(&self) -> Result<CacheInvalidationResponse, Error> {
        let url = format!("{}/api/v1/cache", self.base_url);
        let resp = self.client.delete(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Invalidates cached results for one symbol.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn invalidate_symbol(&self, symbol: &str) -> Result<CacheInvalidationResponse, Error> {
        let url = format!("{}/api/v1/cache/{}", self.base_url, symbol);
        let resp = self.client.delete(&url).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Gets aggregate statistics.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_statistics(&self) -> Result<StatisticsResponse, Error> {
        let url = format!("{}/analytics/statistics", self.base_url);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    /// Gets the Prometheus exposition text.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn get_metrics(&self) -> Result<String, Error> {
        let url = format!("{}/metrics", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.text().await?)
        } else {
            Err(Self::error_from(status.as_u16(), resp.text().await.unwrap_or_default()))
        }
    }

    // ========================================================================
    // Response Handling
    // ========================================================================

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();

        if status.is_success() {
            Ok(resp.json().await?)
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(Self::error_from(status.as_u16(), text))
        }
    }

    fn error_from(status: u16, text: String) -> Error {
        let body = serde_json::from_str::<ErrorBody>(&text).ok();
        if status == 404 {
            return Error::NotFound(body.map(|b| b.error).unwrap_or(text));
        }
        match body {
            Some(body) => Error::Api {
                status,
                code: body.code,
                message: body.error,
            },
            None => Error::Api {
                status,
                code: String::new(),
                message: text,
            },
        }
    }
}
