mod cache;
mod cli;
mod cli_utils;
mod commands;
mod config;
mod config_discovery;
mod events;
mod exec;
mod inputs;
mod logging;
mod merger;
mod runner;
mod spawn;
mod xdg;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use logging::LogFormat;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let file_config = config_discovery::load_config_with_discovery(cli.config.as_deref())?;

    // Initialize structured logging; RUST_LOG and FABRIK_LOG_FORMAT win over the config file
    let (level, format) = match &file_config {
        Some(config) => (
            config.observability.log_level.clone(),
            std::env::var("FABRIK_LOG_FORMAT")
                .ok()
                .and_then(|value| LogFormat::parse(&value))
                .unwrap_or_else(|| config.log_format()),
        ),
        None => ("info".to_string(), LogFormat::from_env()),
    };
    logging::init_with(cli.log_level.as_deref().unwrap_or(&level), format);

    match cli.command {
        Commands::Exec(args) => {
            let code = commands::exec::run(args, file_config)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Cache(args) => commands::cache::run(&args, file_config),
        Commands::Config(args) => commands::config::run(args.command, file_config),
    }
}
