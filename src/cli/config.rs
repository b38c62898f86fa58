//! Config check command handler.

use anyhow::{Context, Result};

use crawlrelay::config::validate::{validate_config, validate_raw, Diagnostic, DiagnosticLevel};
use crawlrelay::config::Config;

use super::{config_path, ConfigAction};

/// Validate the config file, then the effective configuration.
pub(crate) fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { config } => {
            let path = config_path(config.as_deref());
            println!("Config file: {}", path.display());

            let mut diagnostics: Vec<Diagnostic> = Vec::new();

            if path.exists() {
                let content =
                    std::fs::read_to_string(&path).context("Failed to read config file")?;
                let raw: serde_json::Value = match serde_json::from_str(&content) {
                    Ok(v) => v,
                    Err(e) => {
                        println!("[ERROR] Invalid JSON: {}", e);
                        return Ok(());
                    }
                };
                diagnostics.extend(validate_raw(&raw));
            } else {
                println!("[OK] No config file found (using defaults)");
            }

            let effective = match Config::load_from_path(&path) {
                Ok(c) => c,
                Err(e) => {
                    println!("[ERROR] Config does not match the expected shape: {}", e);
                    return Ok(());
                }
            };
            diagnostics.extend(validate_config(&effective));

            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Warn)
                .count();

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
        }
    }
    Ok(())
}
