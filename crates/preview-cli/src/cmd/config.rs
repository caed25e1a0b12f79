use crate::output::{print_json, print_yaml};
use clap::Subcommand;
use preview_core::config::{ControllerConfig, WarnLevel};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the configuration after applying the file, flags and environment
    Show,

    /// Validate the configuration for common mistakes
    Validate,
}

pub fn run(cfg: &ControllerConfig, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show if json => print_json(cfg),
        ConfigSubcommand::Show => print_yaml(cfg),
        ConfigSubcommand::Validate => validate(cfg, json),
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(cfg: &ControllerConfig, json: bool) -> anyhow::Result<()> {
    let warnings = cfg.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
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
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
