//! Telegram bot relay
//!
//! Outbound calls (`sendMessage`, `setWebhook`) go through a teloxide [`Bot`].
//! Inbound updates arrive on the HTTP webhook and are decoded into the small
//! subset of the Bot API `Update` object the relay needs.
//!
//! Webhook requests are authenticated by the `X-Telegram-Bot-Api-Secret-Token`
//! header, which Telegram echoes from the `secret_token` given to `setWebhook`.

use async_trait::async_trait;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use teloxide::payloads::SetWebhookSetters;
use teloxide::requests::Requester;
use teloxide::types::ChatId;
use teloxide::Bot;
use tracing::info;

use crate::error::{RelayError, Result};

use super::Messenger;

/// Header carrying the webhook secret on every inbound update.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Path the webhook is served on, appended to the public URL at registration.
pub const WEBHOOK_PATH: &str = "/webhook";

// ============================================================================
// Inbound Update Types
// ============================================================================

/// An inbound update. Fields the relay does not use are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

impl TelegramUpdate {
    /// Chat id and text of a non-empty text message, if this update carries one.
    pub fn text_message(&self) -> Option<(i64, &str)> {
        let message = self.message.as_ref()?;
        let text = message.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        Some((message.chat.id, text))
    }
}

/// Compare a provided webhook secret with the configured one in constant time.
pub fn secret_matches(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Full webhook URL for a public base URL.
pub fn webhook_url(public_url: &str) -> String {
    format!("{}{}", public_url.trim_end_matches('/'), WEBHOOK_PATH)
}

// ============================================================================
// Messenger
// ============================================================================

/// Telegram implementation of [`Messenger`].
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    /// Create a messenger for the given bot token.
    pub fn new(token: &str) -> Result<Self> {
        Ok(Self {
            bot: build_bot(token)?,
        })
    }
}

/// Build a Telegram bot client with explicit proxy behavior.
///
/// Automatic system proxy detection is disabled; it crashes in some
/// sandboxed macOS environments.
fn build_bot(token: &str) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .no_proxy()
        .build()
        .map_err(|e| RelayError::Telegram(format!("Failed to build Telegram HTTP client: {}", e)))?;
    Ok(Bot::with_client(token.to_string(), client))
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        info!("Telegram: Sending message to chat {}", chat_id);

        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(|e| RelayError::Telegram(format!("Failed to send Telegram message: {}", e)))?;

        info!("Telegram: Message sent successfully to chat {}", chat_id);
        Ok(())
    }

    async fn register_webhook(&self, url: &str, secret: Option<&str>) -> Result<()> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| RelayError::Config(format!("Invalid webhook URL '{}': {}", url, e)))?;

        let mut request = self.bot.set_webhook(parsed);
        if let Some(secret) = secret {
            request = request.secret_token(secret.to_string());
        }

        request
            .await
            .map_err(|e| RelayError::Telegram(format!("setWebhook failed: {}", e)))?;

        info!(url = url, "Telegram webhook registered");
        Ok(())
    }
}
