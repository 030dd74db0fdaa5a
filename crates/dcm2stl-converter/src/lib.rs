//! # dcm2stl converter
//!
//! Batch-converts scan files to meshes by driving a single-session external
//! conversion engine through its control protocol (attach, configure,
//! execute, poll, detach).
//!
//! The engine is fragile: it can drop its session mid-batch, signals
//! completion only through a polled flag, and may finish before the output
//! file is visible on network storage. [`BatchDriver`] hides all of that
//! behind one call that yields exactly one [`ConversionOutcome`] per request,
//! in submission order.
//!
//! ```no_run
//! # async fn demo() -> Result<(), dcm2stl_converter::ConversionError> {
//! use dcm2stl_converter::{BatchDriver, BridgeEngine, RequestDiscovery};
//! use dcm2stl_core::config::AppConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = AppConfig::default();
//! let requests = RequestDiscovery::from_config(&config.discovery)
//!     .await?
//!     .discover(std::path::Path::new("scans"))
//!     .await?;
//! let report = BatchDriver::from_app_config(&config)
//!     .run(BridgeEngine::from_config(&config.engine), requests, CancellationToken::new())
//!     .await?;
//! println!("{}", report.summary);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod catalog;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod report;
pub mod session;
pub mod targets;
pub mod verifier;

pub use bridge::BridgeEngine;
pub use catalog::{EngineStatus, ErrorCatalog, StatusAction};
pub use discovery::RequestDiscovery;
pub use driver::BatchDriver;
pub use error::ConversionError;
pub use events::BatchEvent;
pub use executor::ConversionExecutor;
pub use metrics::{BatchMetrics, MetricsSnapshot};
pub use models::{ConversionOutcome, ConversionRequest, ErrorKind, FormatPair};
pub use poller::{CompletionPoller, PollResult};
pub use report::{BatchReport, BatchSummary};
pub use session::{EngineSession, SessionState};
pub use targets::TargetList;
pub use verifier::{FsProbe, OutputProbe, OutputVerifier, VerifyResult};
