//! Together AI completion client
//!
//! Together exposes an OpenAI-compatible Chat Completions API, so this client
//! speaks that wire format and works against any compatible endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use crawlrelay::services::{CompletionService, TogetherClient};
//!
//! async fn example() {
//!     let client = TogetherClient::new("your-api-key");
//!
//!     let text = client
//!         .complete("You are a helpful assistant.", "Hello!")
//!         .await
//!         .unwrap();
//!
//!     println!("Together: {}", text);
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{CompletionConfig, DEFAULT_COMPLETION_API_BASE, DEFAULT_COMPLETION_MODEL};
use crate::error::{ProviderError, Result};

use super::{ChatMessage, CompletionService};

// ============================================================================
// Chat Completions Request Types
// ============================================================================

/// Chat Completions request body.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    /// Model identifier
    model: &'a str,
    /// Conversation messages (including system)
    messages: Vec<ChatMessage>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ============================================================================
// Chat Completions Response Types
// ============================================================================

/// Chat Completions response body.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    /// Response choices
    choices: Vec<Choice>,
    /// Token usage
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    /// Text content (may be null)
    content: Option<String>,
}

/// Token usage, logged at debug level.
#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// API error response.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

/// API error details. Some compatible servers omit `type`.
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    r#type: Option<String>,
}

// ============================================================================
// Together Client
// ============================================================================

/// Together AI chat completion client.
pub struct TogetherClient {
    /// API key for authentication
    api_key: String,
    /// API base URL
    api_base: String,
    /// Model used for every request
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    /// HTTP client for making requests
    client: Client,
}

impl TogetherClient {
    /// Create a new client with the given API key against the public endpoint.
    ///
    /// # Example
    /// ```
    /// use crawlrelay::services::{CompletionService, TogetherClient};
    ///
    /// let client = TogetherClient::new("tg-xxx");
    /// assert_eq!(client.name(), "together");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_COMPLETION_API_BASE)
    }

    /// Create a new client with a custom base URL (trailing slash removed).
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self::with_client(api_key, api_base, Client::new())
    }

    /// Create a new client with a custom HTTP client.
    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: None,
            temperature: None,
            client,
        }
    }

    /// Build a client from the completion section of the configuration.
    pub fn from_config(config: &CompletionConfig, api_key: &str, client: Client) -> Self {
        Self::with_client(api_key, &config.api_base, client)
            .with_model(&config.model)
            .with_sampling(config.max_tokens, config.temperature)
    }

    /// Override the model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set token limit and temperature; `None` leaves the server default.
    pub fn with_sampling(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Model sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, system: &str, user: &str) -> CompletionRequest<'_> {
        CompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Take the first choice's text; an empty choice list yields an empty string.
fn first_choice_text(response: CompletionResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default()
}

/// Render a non-success body, preferring the structured error message.
fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(parsed) => match parsed.error.r#type {
            Some(kind) => format!(
                "Together API error ({}): {} - {}",
                status, kind, parsed.error.message
            ),
            None => format!("Together API error ({}): {}", status, parsed.error.message),
        },
        Err(_) => format!("Together API error ({}): {}", status, body),
    }
}

// ============================================================================
// CompletionService Implementation
// ============================================================================

#[async_trait]
impl CompletionService for TogetherClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = self.build_request(system, user);

        debug!("Together request to model {}", self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport("Together", &e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(
                ProviderError::from_status(status.as_u16(), describe_error(status, &error_text))
                    .into(),
            );
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            ProviderError::Unknown(format!("Failed to parse Together response: {}", e))
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Together token usage"
            );
        }

        info!("Together response received");
        Ok(first_choice_text(parsed))
    }

    fn name(&self) -> &str {
        "together"
    }
}

// ============================================================================
// Tests
// ============================================================================
