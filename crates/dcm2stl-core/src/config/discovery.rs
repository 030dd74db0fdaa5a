//! Input discovery configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which discovered scan files are converted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Convert every file with the input extension.
    #[default]
    All,
    /// Convert only files whose basename is in the target list.
    TargetsOnly,
}

/// Settings for turning a directory into conversion requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Selection mode.
    #[serde(default)]
    pub mode: DiscoveryMode,
    /// Extension (without dot) of scan files, matched case-insensitively.
    #[serde(default = "default_input_extension")]
    pub input_extension: String,
    /// Extension (without dot) given to mesh output files.
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
    /// Optional JSON file listing target basenames; overrides `targets`.
    #[serde(default)]
    pub target_file: Option<PathBuf>,
    /// Target basenames used in `targets_only` mode.
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::default(),
            input_extension: default_input_extension(),
            output_extension: default_output_extension(),
            target_file: None,
            targets: default_targets(),
        }
    }
}

/// The standard scan names exported by the scanning software.
pub const DEFAULT_TARGETS: [&str; 8] = [
    "PrePreparationScan.dcm",
    "Raw Preparation scan.dcm",
    "PreparationScan.dcm",
    "AntagonistScan.dcm",
    "Raw Antagonist scan.dcm",
    "AbutmentAlignmentScan.dcm",
    "Raw Bite scan.dcm",
    "Raw Bite scan2.dcm",
];

fn default_input_extension() -> String {
    "dcm".to_string()
}

fn default_output_extension() -> String {
    "stl".to_string()
}

fn default_targets() -> Vec<String> {
    DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect()
}
