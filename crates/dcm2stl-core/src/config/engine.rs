//! External conversion engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Settings for reaching the external conversion engine.
///
/// The engine itself is hosted by a helper ("bridge") process that speaks the
/// control protocol over stdin/stdout; see `dcm2stl_converter::bridge`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Format name the engine reads (batch-level `INPUT_FORMAT`).
    #[serde(default = "default_input_format")]
    #[validate(length(min = 1))]
    pub input_format: String,

    /// Format name the engine writes (batch-level `OUTPUT_FORMAT`).
    #[serde(default = "default_output_format")]
    #[validate(length(min = 1))]
    pub output_format: String,

    /// Executable hosting the engine.
    #[serde(default = "default_bridge_command")]
    pub bridge_command: PathBuf,

    /// Extra arguments passed to the bridge executable.
    #[serde(default)]
    pub bridge_args: Vec<String>,

    /// Upper bound for a single request/response exchange with the bridge.
    #[serde(default = "default_response_timeout_seconds")]
    #[validate(range(min = 1, max = 600))]
    pub response_timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_format: default_input_format(),
            output_format: default_output_format(),
            bridge_command: default_bridge_command(),
            bridge_args: Vec::new(),
            response_timeout_seconds: default_response_timeout_seconds(),
        }
    }
}

fn default_input_format() -> String {
    "3Shape".to_string()
}

fn default_output_format() -> String {
    "STL".to_string()
}

fn default_bridge_command() -> PathBuf {
    PathBuf::from("sdx-bridge")
}

fn default_response_timeout_seconds() -> u64 {
    30
}
