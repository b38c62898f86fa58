//! Error types for crawlrelay
//!
//! This module defines the error types used throughout the relay.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations, and maps every error onto an HTTP response
//! so handlers can simply return `Result<T>`.

use std::fmt;
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Fixed message returned to callers refused by a gate in reject mode.
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured classification of upstream (scrape / completion / Telegram) failures.
///
/// Used for logging only: every provider error surfaces to HTTP callers as a 500.
#[derive(Debug)]
pub enum ProviderError {
    /// 401/403: Invalid API key or authentication failure
    Auth(String),
    /// 429: Upstream rate limit or quota exceeded
    RateLimit(String),
    /// 5xx: Server-side errors
    ServerError(String),
    /// Other 4xx: Bad request, malformed parameters, unknown URL
    InvalidRequest(String),
    /// Connection or read timeout
    Timeout(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Classify a non-success upstream HTTP status.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match status {
            401 | 403 => ProviderError::Auth(detail),
            429 => ProviderError::RateLimit(detail),
            408 | 504 => ProviderError::Timeout(detail),
            500..=599 => ProviderError::ServerError(detail),
            400..=499 => ProviderError::InvalidRequest(detail),
            _ => ProviderError::Unknown(detail),
        }
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_transport(service: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(format!("{} request timed out: {}", service, err))
        } else {
            ProviderError::Unknown(format!("{} request failed: {}", service, err))
        }
    }
}

impl From<ProviderError> for RelayError {
    fn from(err: ProviderError) -> Self {
        RelayError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for crawlrelay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors (invalid policy, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or invalid request field
    #[error("{0}")]
    BadRequest(String),

    /// Upstream service failure with classification
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// A gate in reject mode refused admission
    #[error("{}", RATE_LIMITED_MESSAGE)]
    RateLimited {
        /// Time until the oldest call leaves the admission window
        retry_after: Duration,
    },

    /// The request outlived `server.request_timeout_secs`
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Failures raised by the HTTP middleware stack itself
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication failures on inbound requests (webhook secret)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Telegram Bot API failures
    #[error("Telegram error: {0}")]
    Telegram(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayError {
    /// HTTP status used when this error reaches a client.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();

        if let RelayError::RateLimited { retry_after } = &self {
            // Whole seconds, rounded up so clients never retry early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

/// A specialized `Result` type for crawlrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
