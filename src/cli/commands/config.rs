//! `foreman config`: inspect and check configuration.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{output, CommandOutput};
use crate::cli::ConfigCommands;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigOutput {
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("<failed to render configuration: {e}>"))
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationOutput {
    pub path: String,
    pub valid: bool,
    pub max_retries: u32,
    pub technicians: usize,
}

impl CommandOutput for ValidationOutput {
    fn to_human(&self) -> String {
        format!(
            "{} is valid ({} delivery attempt(s), {} technician(s) on the roster)",
            self.path, self.max_retries, self.technicians
        )
    }
}

pub fn execute(command: ConfigCommands, config: &Config, json_mode: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => output(
            &ConfigOutput {
                config: config.clone(),
            },
            json_mode,
        ),
        ConfigCommands::Validate { path } => output(&validate(&path)?, json_mode),
    }
    Ok(())
}

fn validate(path: &Path) -> Result<ValidationOutput> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }
    let config = ConfigLoader::load_from_file(path)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(ValidationOutput {
        path: path.display().to_string(),
        valid: true,
        max_retries: config.bus.max_retries,
        technicians: config.pipeline.technicians.len(),
    })
}
