//! Configuration view and validation commands: `crucible config`.

use anyhow::{Result, bail};
use crucible::config::{CrucibleConfig, CrucibleToml};
use crucible::orchestrator::DeveloperProfile;
use crucible::store::ProjectStore;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = ProjectStore::new(project_dir).config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Crucible Configuration");
            println!("======================");
            println!();

            let file = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                CrucibleToml::load(&config_path)?
            } else {
                println!("No crucible.toml found at {}", config_path.display());
                println!("Using default configuration:");
                CrucibleToml::default()
            };
            println!();
            println!("{}", toml::to_string_pretty(&file)?);

            let config = CrucibleConfig::new(project_dir.to_path_buf())?;
            println!("Effective values (with env/CLI overrides):");
            println!("  project = \"{}\"", config.project_name());
            println!("  autonomous = {}", config.autonomous());
            match config.test_command() {
                Some(cmd) => println!("  test_command = \"{}\"", cmd),
                None => println!("  test_command = (none)"),
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                println!("No crucible.toml found. Using defaults.");
            }
            let warnings = CrucibleToml::load_or_default(&config_path)?.validate();
            if warnings.is_empty() {
                println!("Configuration is valid");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                bail!("crucible.toml already exists at {}", config_path.display());
            }
            let file = CrucibleToml {
                profile: Some(DeveloperProfile::new(whoami_fallback())),
                ..Default::default()
            };
            file.save(&config_path)?;
            println!("Created {}", config_path.display());
        }
    }
    Ok(())
}

fn whoami_fallback() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "developer".to_string())
}
