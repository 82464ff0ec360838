//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(about = "Foreman - predictive maintenance agent fleet", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to load instead of .foreman/config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the fleet in-process and feed it synthetic sensor readings
    Simulate {
        /// Sensor identifier
        #[arg(short, long, default_value = "sensor-1")]
        sensor: String,

        /// Equipment the sensor is mounted on
        #[arg(short, long, default_value = "pump-1")]
        equipment: String,

        /// Measured quantity
        #[arg(short, long, default_value = "temperature")]
        metric: String,

        /// Unit of the measured value
        #[arg(short, long, default_value = "C")]
        unit: String,

        /// Value of the first reading
        #[arg(short, long, default_value = "230.0", allow_negative_numbers = true)]
        value: f64,

        /// Amount added to the value for each following reading
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        step: f64,

        /// Number of readings to publish
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,

    /// Check a configuration file without running anything
    Validate {
        /// Path to the YAML file
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate_defaults() {
        let cli = Cli::try_parse_from(["foreman", "simulate"]).unwrap();
        assert!(!cli.json);
        match cli.command {
            Commands::Simulate { sensor, value, count, step, .. } => {
                assert_eq!(sensor, "sensor-1");
                assert!((value - 230.0).abs() < f64::EPSILON);
                assert!(step.abs() < f64::EPSILON);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_simulate_with_options() {
        let cli = Cli::try_parse_from([
            "foreman", "--json", "simulate", "-s", "vib-7", "-e", "fan-2", "-v", "-12.5", "-n", "4",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Simulate { sensor, equipment, value, count, .. } => {
                assert_eq!(sensor, "vib-7");
                assert_eq!(equipment, "fan-2");
                assert!((value + 12.5).abs() < f64::EPSILON);
                assert_eq!(count, 4);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["foreman", "config", "validate", "site.yaml"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Validate { ref path }) if path == &PathBuf::from("site.yaml")
        ));
    }
}
