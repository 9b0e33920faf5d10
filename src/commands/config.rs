use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::cli::ConfigCommands;
use crate::config::SpawnConfig;

pub fn run(command: ConfigCommands, file_config: Option<SpawnConfig>) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Example => example(),
        ConfigCommands::Show => show(file_config),
    }
}

fn validate(path: &Path) -> Result<()> {
    info!("Validating config file: {}", path.display());

    let config = SpawnConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path.display());
    println!("\nSummary:");
    println!("  - Cache directory: {}", config.cache.dir);
    println!(
        "  - Cache: {}{}",
        if config.cache.enabled { "enabled" } else { "disabled" },
        if config.cache.read_only { " (read-only)" } else { "" }
    );
    println!("  - Cache TTL: {}", config.cache.ttl);
    println!("  - Exec root: {}", config.execution.exec_root);
    println!("  - Default timeout: {}", config.execution.default_timeout);
    println!("  - Strategy: {}", config.execution.strategy);

    Ok(())
}

fn example() -> Result<()> {
    println!("{}", SpawnConfig::example()?);
    Ok(())
}

fn show(file_config: Option<SpawnConfig>) -> Result<()> {
    let config = file_config.unwrap_or_default();

    println!("Effective Configuration:\n");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
