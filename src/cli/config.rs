//! Config check command handler.

use anyhow::{Context, Result};

use graft::config::validate::{validate_config, validate_semantics, DiagnosticLevel};
use graft::config::Config;

use super::ConfigAction;

/// Validate configuration file.
pub(crate) async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check => {
            let config_path = Config::path();
            println!("Config file: {}", config_path.display());

            let mut diagnostics = Vec::new();
            if config_path.exists() {
                let content = std::fs::read_to_string(&config_path)
                    .context("Failed to read config file")?;
                if !content.trim().is_empty() {
                    let raw: serde_json::Value = match serde_json::from_str(&content) {
                        Ok(v) => v,
                        Err(e) => {
                            println!("[ERROR] Invalid JSON: {}", e);
                            return Ok(());
                        }
                    };
                    diagnostics.extend(validate_config(&raw));
                }
            } else {
                println!("[OK] No config file found (using defaults)");
            }

            let config = Config::load().context("Failed to load config")?;
            diagnostics.extend(validate_semantics(&config));

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
