//! Serve command handler.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crawlrelay::config::validate::{has_errors, validate_config, DiagnosticLevel};

use super::{init_logging, load_config};

/// Load config, apply flag overrides, validate and run the server until Ctrl-C.
pub(crate) async fn cmd_serve(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    init_logging(&config)?;

    let diagnostics = validate_config(&config);
    for diag in &diagnostics {
        match diag.level {
            DiagnosticLevel::Error => tracing::error!("{}", diag),
            DiagnosticLevel::Warn => tracing::warn!("{}", diag),
            DiagnosticLevel::Ok => {}
        }
    }
    if has_errors(&diagnostics) {
        anyhow::bail!("Configuration has errors; run `crawlrelay config check` for details");
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting crawlrelay");

    crawlrelay::server::serve(config)
        .await
        .context("Server failed")
}
