//! CLI command definitions and dispatch.

pub mod codes;
pub mod config;
pub mod convert;
pub mod discover;
pub mod targets;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use dcm2stl_core::config::AppConfig;
use dcm2stl_core::error::AppError;

/// dcm2stl: batch conversion of dental scans to STL meshes
#[derive(Debug, Parser)]
#[command(name = "dcm2stl", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Configuration overlay name, e.g. `production` for `config/production.toml`
    #[arg(short, long)]
    pub env: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert every scan under a directory
    Convert(convert::ConvertArgs),
    /// List the conversion requests a directory would produce
    Discover(discover::DiscoverArgs),
    /// Show the engine status code table
    Codes,
    /// Target-name list management
    Targets(targets::TargetsArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Convert(args) => convert::execute(args, &self.loader(), self.format).await,
            Commands::Discover(args) => {
                discover::execute(args, &self.loader(), self.format).await
            }
            Commands::Codes => {
                codes::execute(self.format);
                Ok(())
            }
            Commands::Targets(args) => targets::execute(args, &self.loader(), self.format).await,
            Commands::Config(args) => config::execute(args, &self.loader(), self.format).await,
        }
    }

    fn loader(&self) -> ConfigLoader {
        ConfigLoader {
            path: self.config.clone(),
            env: self.env.clone(),
        }
    }
}

/// Where the configuration comes from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base configuration file.
    pub path: String,
    /// Optional overlay name.
    pub env: Option<String>,
}

impl ConfigLoader {
    /// Load and validate the configuration.
    pub fn load(&self) -> Result<AppConfig, AppError> {
        AppConfig::load(&self.path, self.env.as_deref())
    }
}
