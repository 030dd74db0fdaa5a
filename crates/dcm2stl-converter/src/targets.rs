//! Target-name lists for selective conversion.
//!
//! On disk a list is a JSON object mapping numeric keys to file names:
//!
//! ```json
//! { "1": "PrePreparationScan.dcm", "2": "Raw Preparation scan.dcm" }
//! ```
//!
//! Names are used in numeric key order.

use std::collections::BTreeMap;
use std::path::Path;

use dcm2stl_core::config::discovery::{DEFAULT_TARGETS, DiscoveryConfig};
use tracing::debug;

use crate::error::ConversionError;

/// Ordered list of scan basenames to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetList {
    names: Vec<String>,
}

impl TargetList {
    /// Create a list from names, keeping their order.
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// The eight standard scan names.
    pub fn standard() -> Self {
        Self::new(DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect())
    }

    /// The list a discovery configuration selects: the target file if one is
    /// set, otherwise the inline `targets`.
    pub async fn from_config(config: &DiscoveryConfig) -> Result<Self, ConversionError> {
        match &config.target_file {
            Some(path) => Self::load(path).await,
            None => Ok(Self::new(config.targets.clone())),
        }
    }

    /// Read a list from a JSON target file.
    pub async fn load(path: &Path) -> Result<Self, ConversionError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConversionError::TargetFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let list = Self::parse(&text).map_err(|reason| ConversionError::TargetFile {
            path: path.to_path_buf(),
            reason,
        })?;
        debug!(path = %path.display(), count = list.len(), "Loaded target list");
        Ok(list)
    }

    fn parse(text: &str) -> Result<Self, String> {
        let entries: BTreeMap<u32, String> =
            serde_json::from_str(text).map_err(|e| e.to_string())?;
        if entries.is_empty() {
            return Err("target list is empty".to_string());
        }
        Ok(Self::new(entries.into_values().collect()))
    }

    /// Render the list as a JSON object keyed from 1.
    pub fn to_json(&self) -> Result<String, ConversionError> {
        let entries: BTreeMap<u32, &str> = (1u32..)
            .zip(self.names.iter().map(String::as_str))
            .collect();
        Ok(serde_json::to_string_pretty(&entries)?)
    }

    /// Write the list to `path` as JSON.
    pub async fn write(&self, path: &Path) -> Result<(), ConversionError> {
        let json = self.to_json()?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Whether `file_name` is on the list. Matching is exact.
    pub fn contains(&self, file_name: &str) -> bool {
        self.names.iter().any(|n| n == file_name)
    }

    /// The names, in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for TargetList {
    fn default() -> Self {
        Self::standard()
    }
}
