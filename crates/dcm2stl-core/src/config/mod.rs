//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field has a default so an empty file is valid.

pub mod batch;
pub mod discovery;
pub mod engine;
pub mod logging;

use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::batch::BatchConfig;
pub use self::discovery::{DiscoveryConfig, DiscoveryMode};
pub use self::engine::EngineConfig;
pub use self::logging::LoggingConfig;

use crate::error::AppError;

/// Environment variable prefix for overrides, e.g. `DCM2STL__BATCH__SESSIONS=2`.
const ENV_PREFIX: &str = "DCM2STL";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// External engine settings.
    #[validate(nested)]
    pub engine: EngineConfig,
    /// Per-batch timing and session settings.
    #[validate(nested)]
    pub batch: BatchConfig,
    /// Input discovery settings.
    pub discovery: DiscoveryConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// Merges the given file with an optional `{dir}/{env}.toml` overlay and
    /// environment variables prefixed with `DCM2STL__`. A missing base file is
    /// not an error: defaults apply.
    pub fn load(config_path: &str, env: Option<&str>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false));

        if let Some(env) = env {
            let dir = Path::new(config_path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let overlay = dir.join(env);
            builder = builder.add_source(
                config::File::with_name(&overlay.to_string_lossy()).required(false),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Render this configuration as TOML-compatible pretty JSON for display.
    pub fn to_pretty_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
