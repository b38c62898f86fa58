//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod serve;
pub mod webhook;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crawlrelay::config::Config;

#[derive(Parser)]
#[command(name = "crawlrelay")]
#[command(version)]
#[command(about = "Rate-limited relay for scraping, LLM completion and a Telegram bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Config file (defaults to ~/.crawlrelay/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Register the Telegram webhook and exit
    SetWebhook {
        /// Config file (defaults to ~/.crawlrelay/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Check the config file and environment for problems
    Check {
        /// Config file (defaults to ~/.crawlrelay/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    // A missing .env is normal; only the process environment is used then.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        config: None,
        host: None,
        port: None,
    }) {
        Commands::Serve { config, host, port } => {
            serve::cmd_serve(config.as_deref(), host, port).await?;
        }
        Commands::SetWebhook { config } => {
            webhook::cmd_set_webhook(config.as_deref()).await?;
        }
        Commands::Config { action } => {
            config::cmd_config(action)?;
        }
        Commands::Version => {
            cmd_version();
        }
    }

    Ok(())
}

/// Resolve the config file path: explicit flag or the default location.
pub(crate) fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(Config::path)
}

/// Load configuration with environment overrides applied.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = config_path(explicit);
    Config::load_from_path(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Install the tracing subscriber described by the config.
pub(crate) fn init_logging(config: &Config) -> Result<()> {
    crawlrelay::utils::logging::init_logging(&config.logging)
        .context("Failed to initialize logging")
}

fn cmd_version() {
    println!("crawlrelay {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Rate-limited relay for scraping, LLM completion and a Telegram bot");
}
