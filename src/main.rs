//! Foreman CLI entry point.

use anyhow::Result;
use clap::Parser;

use foreman::cli::commands::simulate::ReadingSeries;
use foreman::cli::{Cli, Commands};
use foreman::domain::models::Config;
use foreman::infrastructure::config::ConfigLoader;
use foreman::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        foreman::cli::handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    match cli.command {
        Commands::Simulate {
            sensor,
            equipment,
            metric,
            unit,
            value,
            step,
            count,
        } => {
            let series = ReadingSeries {
                sensor,
                equipment,
                metric,
                unit,
                start: value,
                step,
                count,
            };
            foreman::cli::commands::simulate::execute(series, &config, cli.json).await
        }
        Commands::Config(command) => foreman::cli::commands::config::execute(command, &config, cli.json),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}
