use crate::cli::ConfigCommands;
use crate::config::PitlaneConfig;
use anyhow::Result;
use std::path::Path;

pub fn run(cmd: ConfigCommands, config_path: &Path) -> Result<()> {
    match cmd {
        ConfigCommands::Validate => validate(config_path),
        ConfigCommands::Show => show(config_path),
    }
}

fn validate(config_path: &Path) -> Result<()> {
    let mut config = match PitlaneConfig::load_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("❌ Failed to parse {}: {:#}", config_path.display(), e);
            std::process::exit(1);
        }
    };
    config.apply_env();

    let errors = config.validate();
    if errors.is_empty() {
        if config_path.exists() {
            println!("✅ {} is valid.", config_path.display());
        } else {
            println!("✅ {} not found; defaults are valid.", config_path.display());
        }
    } else {
        println!("❌ Validation errors in {}:", config_path.display());
        for e in &errors {
            println!("  - {}", e);
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Print the effective configuration, environment overrides included.
fn show(config_path: &Path) -> Result<()> {
    let mut config = PitlaneConfig::load_or_default(config_path)?;
    config.apply_env();
    match toml::to_string_pretty(&config) {
        Ok(s) => println!("{}", s),
        Err(e) => anyhow::bail!("Failed to serialize config: {}", e),
    }
    Ok(())
}
