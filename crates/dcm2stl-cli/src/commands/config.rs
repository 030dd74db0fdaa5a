//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use super::ConfigLoader;
use crate::output::{self, OutputFormat};
use dcm2stl_core::error::AppError;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Validate the configuration
    Validate,
    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config/generated.toml")]
        output: String,
    },
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    loader: &ConfigLoader,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = loader.load()?;
            match format {
                OutputFormat::Json => output::print_json(&config),
                OutputFormat::Table => println!("{}", config.to_pretty_json()?),
            }
        }
        ConfigCommand::Validate => match loader.load() {
            Ok(config) => {
                output::print_success(&format!("Configuration '{}' is valid", loader.path));
                output::print_kv(
                    "Formats",
                    &format!(
                        "{} -> {}",
                        config.engine.input_format, config.engine.output_format
                    ),
                );
                output::print_kv("Bridge", &config.engine.bridge_command.display().to_string());
                output::print_kv(
                    "Polling",
                    &format!(
                        "every {} ms, up to {} ms",
                        config.batch.poll_interval_ms, config.batch.poll_timeout_ms
                    ),
                );
                output::print_kv(
                    "Verification",
                    &format!(
                        "{} re-checks, {} ms apart",
                        config.batch.verify_retries, config.batch.verify_delay_ms
                    ),
                );
                output::print_kv("Sessions", &config.batch.sessions.to_string());
            }
            Err(e) => {
                output::print_error(&format!("Configuration invalid: {}", e));
                return Err(e);
            }
        },
        ConfigCommand::Generate { output: out_path } => {
            let default_config = include_str!("../../../../config/default.toml");

            if let Some(parent) = std::path::Path::new(out_path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::internal(format!("Failed to create dir: {}", e)))?;
            }

            tokio::fs::write(out_path, default_config)
                .await
                .map_err(|e| AppError::internal(format!("Failed to write config: {}", e)))?;

            output::print_success(&format!("Default config written to '{}'", out_path));
        }
    }

    Ok(())
}
