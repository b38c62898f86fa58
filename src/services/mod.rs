//! Upstream services the relay talks to.
//!
//! Each remote capability sits behind a trait so handlers can be exercised
//! against fakes:
//!
//! - [`ScrapeService`]: fetch a page as structured JSON (Firecrawl)
//! - [`CompletionService`]: chat completion (Together AI, OpenAI-compatible)
//! - [`Messenger`]: outbound bot messages and webhook registration (Telegram)

pub mod firecrawl;
pub mod telegram;
pub mod together;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use firecrawl::FirecrawlClient;
pub use telegram::{TelegramMessenger, TelegramUpdate};
pub use together::TogetherClient;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One message of a completion prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Web page scraping.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScrapeService: Send + Sync {
    /// Scrape `url` and return the service's result document.
    ///
    /// The document carries at least a `markdown` field on success.
    async fn scrape(&self, url: &str) -> Result<Value>;

    /// Short service name for logs.
    fn name(&self) -> &str;
}

/// Chat completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete a system prompt plus one user turn and return the assistant's text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Short service name for logs.
    fn name(&self) -> &str;
}

/// Outbound side of the chat bot.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Point the bot's webhook at `url`, optionally with a shared secret.
    async fn register_webhook(&self, url: &str, secret: Option<&str>) -> Result<()>;
}

/// Extract the markdown body from a scrape result, if present.
pub fn markdown_of(result: &Value) -> Option<&str> {
    result.get("markdown").and_then(Value::as_str)
}
