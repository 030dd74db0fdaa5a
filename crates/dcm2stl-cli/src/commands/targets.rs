//! Target-name list commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use super::ConfigLoader;
use crate::output::{self, OutputFormat};
use dcm2stl_converter::TargetList;
use dcm2stl_core::error::AppError;

/// Arguments for targets commands
#[derive(Debug, Args)]
pub struct TargetsArgs {
    /// Targets subcommand
    #[command(subcommand)]
    pub command: TargetsCommand,
}

/// Targets subcommands
#[derive(Debug, Subcommand)]
pub enum TargetsCommand {
    /// Show the active target list
    Show {
        /// Read this JSON target list instead of the configured one
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Write the standard target list as JSON
    Write {
        /// Output file path
        #[arg(short, long, default_value = "config/target_config.json")]
        output: PathBuf,

        /// Overwrite without asking
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct TargetRow {
    #[tabled(rename = "#")]
    number: usize,
    #[tabled(rename = "File name")]
    name: String,
}

/// Execute targets commands
pub async fn execute(
    args: &TargetsArgs,
    loader: &ConfigLoader,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        TargetsCommand::Show { file } => {
            let list = match file {
                Some(path) => TargetList::load(path).await?,
                None => TargetList::from_config(&loader.load()?.discovery).await?,
            };
            let rows: Vec<TargetRow> = list
                .names()
                .iter()
                .enumerate()
                .map(|(i, name)| TargetRow {
                    number: i + 1,
                    name: name.clone(),
                })
                .collect();
            output::print_list(&rows, format);
        }
        TargetsCommand::Write { output: out_path, force } => {
            if !force && tokio::fs::try_exists(out_path).await.unwrap_or(false) {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!("Overwrite '{}'?", out_path.display()))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {}", e)))?;

                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            TargetList::standard().write(out_path).await?;
            output::print_success(&format!("Target list written to '{}'", out_path.display()));
        }
    }

    Ok(())
}
