//! Unified error type for the conversion orchestrator.
//!
//! Only batch-level failures are errors. Per-request failures are recorded
//! in [`crate::models::ConversionOutcome`] and never surface here.

use dcm2stl_core::error::AppError;
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for batch-level conversion failures.
#[derive(Debug, Error)]
pub enum ConversionError {
    // --- Engine errors ---
    /// The engine could not be attached; no progress is possible.
    #[error("Conversion engine unavailable: {reason}")]
    EngineUnavailable {
        /// Why the attach failed.
        reason: String,
    },

    /// An operation that requires an attached session was called while detached.
    #[error("Engine session is not attached")]
    NotAttached,

    /// The engine bridge process could not be started.
    #[error("Failed to start engine bridge '{command}': {reason}")]
    BridgeSpawn {
        /// The configured bridge command.
        command: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    // --- Input errors ---
    /// The directory to convert does not exist.
    #[error("Directory does not exist: {path}")]
    DirectoryNotFound {
        /// The missing directory.
        path: PathBuf,
    },

    /// A conversion request could not be built from the given path.
    #[error("Invalid conversion request for {path}: {reason}")]
    InvalidRequest {
        /// The offending input path.
        path: PathBuf,
        /// Why the request is invalid.
        reason: String,
    },

    /// The target list file could not be read or parsed.
    #[error("Invalid target list {path}: {reason}")]
    TargetFile {
        /// The target list file.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    // --- Generic errors ---
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tokio task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        match &err {
            ConversionError::EngineUnavailable { .. }
            | ConversionError::NotAttached
            | ConversionError::BridgeSpawn { .. } => AppError::engine(err.to_string()),
            ConversionError::DirectoryNotFound { .. } => AppError::not_found(err.to_string()),
            ConversionError::InvalidRequest { .. } | ConversionError::TargetFile { .. } => {
                AppError::validation(err.to_string())
            }
            ConversionError::Io(_) => AppError::storage(err.to_string()),
            _ => AppError::internal(err.to_string()),
        }
    }
}
