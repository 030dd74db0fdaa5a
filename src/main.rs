//! dcm2stl batch runner.
//!
//! Converts every scan under the directory given as the first argument,
//! logging progress through `tracing`. Configuration comes from
//! `DCM2STL_CONFIG` (default `config/default.toml`) with an optional
//! `DCM2STL_ENV` overlay.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

use dcm2stl_converter::{BatchDriver, BridgeEngine, RequestDiscovery};
use dcm2stl_core::config::AppConfig;
use dcm2stl_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    let Some(directory) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: dcm2stl <scan-directory>");
        std::process::exit(2);
    };

    if let Err(e) = run(config, directory).await {
        tracing::error!("Batch aborted: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("DCM2STL_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let env = std::env::var("DCM2STL_ENV").ok();

    AppConfig::load(&config_path, env.as_deref())
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig, directory: PathBuf) -> Result<(), AppError> {
    tracing::info!("Starting dcm2stl v{}", env!("CARGO_PKG_VERSION"));

    let discovery = RequestDiscovery::from_config(&config.discovery).await?;
    let requests = discovery.discover(&directory).await?;
    if requests.is_empty() {
        tracing::warn!(directory = %directory.display(), "No matching scan files");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current file");
                cancel.cancel();
            }
        });
    }

    let sessions = config.batch.sessions.min(requests.len());
    let driver = BatchDriver::from_app_config(&config);
    let report = if sessions <= 1 {
        driver
            .run(BridgeEngine::from_config(&config.engine), requests, cancel)
            .await?
    } else {
        let engines = (0..sessions)
            .map(|_| BridgeEngine::from_config(&config.engine))
            .collect();
        driver.run_parallel(engines, requests, cancel).await?
    };

    for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
        tracing::warn!(
            input = %outcome.request.input().display(),
            result = %outcome.label(),
            note = outcome.note.as_deref().unwrap_or(""),
            "File not converted"
        );
    }

    tracing::info!(
        batch_id = %report.batch_id,
        cancelled = report.cancelled,
        skipped = report.skipped,
        "Batch complete: {}",
        report.summary
    );
    Ok(())
}
