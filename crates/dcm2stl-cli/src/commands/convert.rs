//! Batch conversion command.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ConfigLoader;
use crate::output::{self, OutputFormat};
use dcm2stl_converter::{
    BatchDriver, BatchEvent, BatchReport, BridgeEngine, ConversionOutcome, RequestDiscovery,
};
use dcm2stl_core::config::{AppConfig, DiscoveryMode};
use dcm2stl_core::error::AppError;

/// Arguments for convert
#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Directory to convert (searched recursively)
    pub directory: PathBuf,

    /// Only convert files whose names are on the target list
    #[arg(long)]
    pub targets_only: bool,

    /// JSON target list to use instead of the configured one
    #[arg(long)]
    pub target_file: Option<PathBuf>,

    /// Number of independent engine sessions
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    pub sessions: Option<u8>,

    /// Probe the session before every request
    #[arg(long)]
    pub health_probe: bool,

    /// Do not print per-file progress
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct OutcomeRow {
    #[tabled(rename = "#")]
    sequence: usize,
    #[tabled(rename = "Input")]
    input: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Retried")]
    retried: bool,
    #[tabled(rename = "Polls")]
    polls: u32,
    #[tabled(rename = "Checks")]
    verify_checks: u32,
    #[tabled(rename = "ms")]
    elapsed_ms: u64,
}

impl From<&ConversionOutcome> for OutcomeRow {
    fn from(o: &ConversionOutcome) -> Self {
        Self {
            sequence: o.sequence,
            input: o.request.input().display().to_string(),
            result: o.label(),
            status: o
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            retried: o.retried,
            polls: o.polls,
            verify_checks: o.verify_checks,
            elapsed_ms: o.elapsed.as_millis() as u64,
        }
    }
}

/// Apply command-line discovery overrides to the loaded configuration.
pub(crate) fn apply_discovery_overrides(
    config: &mut AppConfig,
    targets_only: bool,
    target_file: Option<&Path>,
) {
    if targets_only {
        config.discovery.mode = DiscoveryMode::TargetsOnly;
    }
    if let Some(path) = target_file {
        config.discovery.target_file = Some(path.to_path_buf());
    }
}

/// Execute convert
pub async fn execute(
    args: &ConvertArgs,
    loader: &ConfigLoader,
    format: OutputFormat,
) -> Result<(), AppError> {
    let mut config = loader.load()?;
    apply_discovery_overrides(&mut config, args.targets_only, args.target_file.as_deref());
    if let Some(sessions) = args.sessions {
        config.batch.sessions = usize::from(sessions);
    }
    if args.health_probe {
        config.batch.health_probe = true;
    }

    let discovery = RequestDiscovery::from_config(&config.discovery).await?;
    let requests = discovery.discover(&args.directory).await?;
    if requests.is_empty() {
        output::print_warning(&format!(
            "No matching files under '{}'",
            args.directory.display()
        ));
        return Ok(());
    }

    let total = requests.len();
    let sessions = config.batch.sessions.min(total);
    let live = format == OutputFormat::Table && !args.quiet;
    if live {
        println!(
            "Converting {} file(s) with {} engine session(s)...",
            total, sessions
        );
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                output::print_warning("Interrupted: finishing the current file, then stopping");
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = mpsc::channel(256);
    let progress = tokio::spawn(print_progress(rx, total, live));

    let driver = BatchDriver::from_app_config(&config).with_events(tx);
    let result = if sessions <= 1 {
        driver
            .run(BridgeEngine::from_config(&config.engine), requests, cancel)
            .await
    } else {
        let engines = (0..sessions)
            .map(|_| BridgeEngine::from_config(&config.engine))
            .collect();
        driver.run_parallel(engines, requests, cancel).await
    };
    drop(driver);
    interrupt.abort();
    if let Err(e) = progress.await {
        tracing::debug!(error = %e, "Progress printer ended abnormally");
    }

    let report = result?;
    print_report(&report, format);
    Ok(())
}

async fn print_progress(mut rx: mpsc::Receiver<BatchEvent>, total: usize, live: bool) {
    let mut done = 0usize;
    while let Some(event) = rx.recv().await {
        if !live {
            continue;
        }
        match event {
            BatchEvent::RequestFinished { outcome } => {
                done += 1;
                println!(
                    "[{}/{}] {:<16} {}",
                    done,
                    total,
                    outcome.label(),
                    outcome.request.input().display()
                );
            }
            BatchEvent::Reattached {
                sequence,
                succeeded,
            } => {
                if succeeded {
                    output::print_warning(&format!("Engine reattached (file #{})", sequence));
                } else {
                    output::print_error(&format!("Engine reattach failed (file #{})", sequence));
                }
            }
            BatchEvent::BatchStarted { .. }
            | BatchEvent::RequestStarted { .. }
            | BatchEvent::BatchFinished { .. } => {}
        }
    }
}

fn print_report(report: &BatchReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_json(report),
        OutputFormat::Table => {
            let rows: Vec<OutcomeRow> = report.outcomes.iter().map(OutcomeRow::from).collect();
            output::print_list(&rows, format);

            println!("Batch {}:", report.batch_id);
            output::print_kv("Converted", &report.summary.converted.to_string());
            output::print_kv(
                "Reported but not found",
                &report.summary.not_observed.to_string(),
            );
            output::print_kv("Failed", &report.summary.failed.to_string());
            for (kind, count) in &report.summary.failed_by_kind {
                output::print_kv(&format!("  {}", kind), &count.to_string());
            }
            output::print_kv("Retried after detach", &report.summary.retried.to_string());
            output::print_kv(
                "Duration",
                &format!("{:.1}s", report.duration().num_milliseconds() as f64 / 1000.0),
            );

            if report.cancelled {
                output::print_warning(&format!(
                    "Cancelled; {} file(s) not started",
                    report.skipped
                ));
            } else if report.all_converted() {
                output::print_success("All files converted");
            }
        }
    }
}
