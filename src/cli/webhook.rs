//! Set-webhook command handler.

use std::path::Path;

use anyhow::{Context, Result};

use crawlrelay::services::telegram::webhook_url;
use crawlrelay::services::{Messenger, TelegramMessenger};

use super::{init_logging, load_config};

/// Register `{public_url}/webhook` with Telegram using the configured secret.
pub(crate) async fn cmd_set_webhook(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(&config)?;

    let token = config
        .telegram
        .token
        .as_deref()
        .context("TELEGRAM_BOT_TOKEN is not set")?;
    let public_url = config
        .telegram
        .public_url
        .as_deref()
        .context("PUBLIC_URL is not set")?;

    let messenger = TelegramMessenger::new(token)?;
    let url = webhook_url(public_url);
    messenger
        .register_webhook(&url, config.telegram.webhook_secret.as_deref())
        .await
        .context("Webhook setup failed")?;

    println!("Webhook setup ok: {}", url);
    if config.telegram.webhook_secret.is_none() {
        println!("Warning: no TELEGRAM_WEBHOOK_SECRET set, /webhook accepts unauthenticated updates");
    }
    Ok(())
}
