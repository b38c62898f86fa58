//! Configuration management for crawlrelay
//!
//! This module provides configuration loading and saving.
//! Configuration is loaded from `~/.crawlrelay/config.json` (or an explicit
//! path) and then overridden from the environment. Values are read once at
//! startup; there is no reload.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::gate::{GateMode, GatePolicy};

impl Config {
    /// Returns the crawlrelay configuration directory path (~/.crawlrelay)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".crawlrelay")
    }

    /// Returns the path to the config file (~/.crawlrelay/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration
    /// with environment overrides applied.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read a config file without applying the environment.
    pub fn read_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(Config::default())
        }
    }

    /// Apply process environment overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored. Unparseable numbers keep the previous value.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // Server
        if let Some(val) = var("HOST") {
            self.server.host = val;
        }
        if let Some(v) = var("PORT").and_then(|val| val.trim().parse().ok()) {
            self.server.port = v;
        }
        if let Some(v) = var("REQUEST_TIMEOUT_SECS").and_then(|val| val.trim().parse().ok()) {
            self.server.request_timeout_secs = v;
        }

        // Scrape service
        if let Some(val) = var("FIRECRAWL_SECRET_KEY") {
            self.scrape.api_key = Some(val);
        }
        if let Some(val) = var("FIRECRAWL_API_BASE") {
            self.scrape.api_base = val;
        }

        // Completion service
        if let Some(val) = var("TOGETHER_SECRET_KEY") {
            self.completion.api_key = Some(val);
        }
        if let Some(val) = var("TOGETHER_API_BASE") {
            self.completion.api_base = val;
        }
        if let Some(val) = var("TOGETHER_MODEL") {
            self.completion.model = val;
        }

        // Telegram
        if let Some(val) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.token = Some(val);
        }
        if let Some(val) = var("TELEGRAM_WEBHOOK_SECRET") {
            self.telegram.webhook_secret = Some(val);
        }
        if let Some(val) = var("PUBLIC_URL") {
            self.telegram.public_url = Some(val);
        }
        if let Some(v) = var("TELEGRAM_MAX_PENDING_RELAYS").and_then(|val| val.trim().parse().ok()) {
            self.telegram.max_pending_relays = v;
        }

        // CORS
        if let Some(val) = var("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = val
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Rate limit
        if let Some(v) = var("RATE_LIMIT_CALLS").and_then(|val| val.trim().parse().ok()) {
            self.rate_limit.max_calls = v;
        }
        if let Some(v) = var("RATE_LIMIT_PERIOD").and_then(|val| val.trim().parse().ok()) {
            self.rate_limit.period_secs = v;
        }
        if let Some(val) = var("RATE_LIMIT_MODE") {
            match val.trim().to_ascii_lowercase().as_str() {
                "block" => self.rate_limit.mode = GateMode::Block,
                "reject" => self.rate_limit.mode = GateMode::Reject,
                _ => {}
            }
        }

        // Logging
        if let Some(val) = var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(v) = var("LOG_FORMAT").and_then(|val| val.parse().ok()) {
            self.logging.format = v;
        }
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Admission policy for outbound calls. Fails on a zero limit or period.
    pub fn gate_policy(&self) -> Result<GatePolicy> {
        GatePolicy::new(
            self.rate_limit.max_calls,
            Duration::from_secs(self.rate_limit.period_secs),
        )
    }

    /// `host:port` the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
