//! Configuration type definitions for crawlrelay
//!
//! This module defines all configuration structs used by the relay.
//! All types implement serde traits for JSON serialization and have sensible defaults.

use serde::{Deserialize, Serialize};

use crate::gate::GateMode;

/// Main configuration struct for crawlrelay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Scrape service (Firecrawl) configuration
    pub scrape: ScrapeConfig,
    /// Completion service (Together AI) configuration
    pub completion: CompletionConfig,
    /// Telegram bot relay configuration
    pub telegram: TelegramConfig,
    /// Cross-origin policy
    pub cors: CorsConfig,
    /// Outbound call admission window
    pub rate_limit: RateLimitConfig,
    /// Grant-page analysis settings
    pub grant: GrantConfig,
    /// People-matching settings
    pub findpeople: FindPeopleConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Upper bound on a whole request, including time spent waiting at the gate
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_secs: 120,
        }
    }
}

// ============================================================================
// Upstream Services
// ============================================================================

pub const DEFAULT_SCRAPE_API_BASE: &str = "https://api.firecrawl.dev";
pub const DEFAULT_COMPLETION_API_BASE: &str = "https://api.together.xyz/v1";
pub const DEFAULT_COMPLETION_MODEL: &str = "meta-llama/Meta-Llama-3-70B-Instruct-Turbo";

/// Scrape service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// API key for authentication
    pub api_key: Option<String>,
    /// API base URL
    pub api_base: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_SCRAPE_API_BASE.to_string(),
        }
    }
}

/// Completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// API key for authentication
    pub api_key: Option<String>,
    /// API base URL (OpenAI-compatible)
    pub api_base: String,
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_COMPLETION_API_BASE.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from BotFather
    pub token: Option<String>,
    /// Shared secret Telegram echoes in `X-Telegram-Bot-Api-Secret-Token`
    pub webhook_secret: Option<String>,
    /// Public base URL of this server, used to register `{public_url}/webhook`
    pub public_url: Option<String>,
    /// Chat replies allowed in flight at once; further updates are dropped
    pub max_pending_relays: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            webhook_secret: None,
            public_url: None,
            max_pending_relays: 32,
        }
    }
}

// ============================================================================
// HTTP Policy
// ============================================================================

/// Cross-origin policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl CorsConfig {
    /// True when any origin is allowed.
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o.trim() == "*")
    }
}

/// Outbound call admission window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls allowed per window, per upstream service
    pub max_calls: u32,
    /// Window length in seconds
    pub period_secs: u64,
    /// Wait for a slot (`block`) or answer 429 (`reject`)
    pub mode: GateMode,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            period_secs: 60,
            mode: GateMode::Block,
        }
    }
}

// ============================================================================
// Endpoint Settings
// ============================================================================

/// Grant-page analysis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantConfig {
    /// Scraped characters forwarded to the model before truncation
    pub max_content_chars: usize,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            max_content_chars: 12_000,
        }
    }
}

pub const DEFAULT_FINDPEOPLE_SOURCE_URL: &str = "https://www.carelinx.com/caregivers/ca/sunnyvale";

/// People-matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FindPeopleConfig {
    /// Directory page scraped for candidates
    pub source_url: String,
}

impl Default for FindPeopleConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_FINDPEOPLE_SOURCE_URL.to_string(),
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,
    /// Compact single-line output with targets
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "component" | "compact" => Ok(LogFormat::Component),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Optional file to append log lines to (JSON format only)
    pub file: Option<String>,
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            file: None,
            level: "info".to_string(),
        }
    }
}
