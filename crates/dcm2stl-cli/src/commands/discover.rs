//! Dry-run discovery: what a conversion would touch.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use super::ConfigLoader;
use crate::output::{self, OutputFormat};
use dcm2stl_converter::RequestDiscovery;
use dcm2stl_core::error::AppError;

/// Arguments for discover
#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Directory to scan
    pub directory: PathBuf,

    /// Only list files whose names are on the target list
    #[arg(long)]
    pub targets_only: bool,

    /// JSON target list to use instead of the configured one
    #[arg(long)]
    pub target_file: Option<PathBuf>,
}

#[derive(Debug, Serialize, Tabled)]
struct RequestRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Input")]
    input: String,
    #[tabled(rename = "Output")]
    output: String,
    #[tabled(rename = "Output exists")]
    output_exists: bool,
}

/// Execute discover
pub async fn execute(
    args: &DiscoverArgs,
    loader: &ConfigLoader,
    format: OutputFormat,
) -> Result<(), AppError> {
    let mut config = loader.load()?;
    super::convert::apply_discovery_overrides(
        &mut config,
        args.targets_only,
        args.target_file.as_deref(),
    );

    let discovery = RequestDiscovery::from_config(&config.discovery).await?;
    let requests = discovery.discover(&args.directory).await?;

    let mut rows = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        rows.push(RequestRow {
            index,
            input: request.input().display().to_string(),
            output: request.output().display().to_string(),
            output_exists: tokio::fs::try_exists(request.output())
                .await
                .unwrap_or(false),
        });
    }

    output::print_list(&rows, format);
    if format == OutputFormat::Table {
        println!("{} file(s) would be converted", rows.len());
    }
    Ok(())
}
