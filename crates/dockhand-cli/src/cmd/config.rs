use clap::Subcommand;
use dockhand_core::config::{ConfigWarning, RuntimeConfig, Settings, WarnLevel};
use std::path::Path;

use super::load_settings;
use crate::output::print_json;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Check the settings file for problems
    Validate,
    /// Print the effective settings, defaults included
    Show,
}

pub fn run(path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate => validate(path, json),
        ConfigSubcommand::Show => show(path, json),
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(path: &Path, json: bool) -> anyhow::Result<()> {
    let settings = load_settings(path)?;
    let mut warnings = settings.validate();
    warnings.extend(runtime_warnings(&settings));

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Settings are valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("settings validation found errors");
    }
    Ok(())
}

/// Checks that need the host, not just the file.
fn runtime_warnings(settings: &Settings) -> Vec<ConfigWarning> {
    match &settings.runtime {
        RuntimeConfig::Cli { binary } if !binary.trim().is_empty() => {
            if which::which(binary).is_err() {
                vec![ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("runtime.binary '{binary}' was not found on PATH"),
                }]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(path: &Path, json: bool) -> anyhow::Result<()> {
    let mut settings = load_settings(path)?;
    if settings.server.gateway_token.is_some() {
        settings.server.gateway_token = Some("********".to_string());
    }

    if json {
        print_json(&settings)?;
    } else {
        print!("{}", serde_yaml::to_string(&settings)?);
    }
    Ok(())
}
