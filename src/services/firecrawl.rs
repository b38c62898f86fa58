//! Firecrawl scrape client
//!
//! Implements [`ScrapeService`] against Firecrawl's `/v1/scrape` endpoint,
//! always asking for markdown output.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ProviderError, Result};

use super::ScrapeService;

/// Default Firecrawl API endpoint.
const FIRECRAWL_API_URL: &str = "https://api.firecrawl.dev";

// ============================================================================
// Firecrawl API Types
// ============================================================================

/// Scrape request body.
#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
}

/// Scrape response envelope.
#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

// ============================================================================
// Client
// ============================================================================

/// Firecrawl scrape client.
pub struct FirecrawlClient {
    api_key: String,
    api_base: String,
    client: Client,
}

impl FirecrawlClient {
    /// Create a client against the public Firecrawl endpoint.
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, FIRECRAWL_API_URL)
    }

    /// Create a client against a custom base URL (trailing slash removed).
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self::with_client(api_key, api_base, Client::new())
    }

    /// Create a client with a preconfigured HTTP client.
    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/scrape", self.api_base)
    }
}

/// Turn a decoded 2xx envelope into the result document.
fn unwrap_envelope(response: ScrapeResponse) -> Result<Value> {
    if !response.success {
        let detail = response
            .error
            .unwrap_or_else(|| "scrape reported failure".to_string());
        return Err(ProviderError::Unknown(format!("Firecrawl: {}", detail)).into());
    }
    response
        .data
        .ok_or_else(|| ProviderError::Unknown("Firecrawl: response had no data".into()).into())
}

#[async_trait]
impl ScrapeService for FirecrawlClient {
    async fn scrape(&self, url: &str) -> Result<Value> {
        let request = ScrapeRequest {
            url,
            formats: ["markdown"],
        };

        debug!(url = url, "Firecrawl scrape request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport("Firecrawl", &e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&error_text)
                .map(|body| body.error)
                .unwrap_or(error_text);
            return Err(ProviderError::from_status(
                status.as_u16(),
                format!("Firecrawl API error ({}): {}", status, detail),
            )
            .into());
        }

        let envelope: ScrapeResponse = response.json().await.map_err(|e| {
            ProviderError::Unknown(format!("Failed to parse Firecrawl response: {}", e))
        })?;

        info!(url = url, "Firecrawl scrape completed");
        unwrap_envelope(envelope)
    }

    fn name(&self) -> &str {
        "firecrawl"
    }
}
