//! Turns a directory of scans into an ordered list of conversion requests.

use std::path::{Path, PathBuf};

use dcm2stl_core::config::discovery::{DiscoveryConfig, DiscoveryMode};
use tracing::{debug, info, warn};

use crate::error::ConversionError;
use crate::models::ConversionRequest;
use crate::targets::TargetList;

/// Walks a directory tree and selects scan files.
#[derive(Debug, Clone)]
pub struct RequestDiscovery {
    mode: DiscoveryMode,
    input_extension: String,
    output_extension: String,
    targets: TargetList,
}

impl RequestDiscovery {
    /// Create a discovery pass.
    pub fn new(
        mode: DiscoveryMode,
        input_extension: impl Into<String>,
        output_extension: impl Into<String>,
        targets: TargetList,
    ) -> Self {
        Self {
            mode,
            input_extension: input_extension.into().trim_start_matches('.').to_string(),
            output_extension: output_extension.into().trim_start_matches('.').to_string(),
            targets,
        }
    }

    /// Build from configuration, loading the target file if one is set.
    pub async fn from_config(config: &DiscoveryConfig) -> Result<Self, ConversionError> {
        let targets = match config.mode {
            DiscoveryMode::TargetsOnly => TargetList::from_config(config).await?,
            DiscoveryMode::All => TargetList::new(config.targets.clone()),
        };
        Ok(Self::new(
            config.mode,
            &config.input_extension,
            &config.output_extension,
            targets,
        ))
    }

    /// Selection mode.
    pub fn mode(&self) -> DiscoveryMode {
        self.mode
    }

    /// Target names used in `targets_only` mode.
    pub fn targets(&self) -> &TargetList {
        &self.targets
    }

    /// Whether `path` is a scan file this pass would convert.
    pub fn selects(&self, path: &Path) -> bool {
        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.input_extension));
        if !has_extension {
            return false;
        }
        match self.mode {
            DiscoveryMode::All => true,
            DiscoveryMode::TargetsOnly => path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| self.targets.contains(n)),
        }
    }

    /// Recursively collect requests under `root`, sorted by input path.
    ///
    /// Unreadable subdirectories and entries are skipped with a warning; a
    /// missing root is an error.
    pub async fn discover(&self, root: &Path) -> Result<Vec<ConversionRequest>, ConversionError> {
        if !tokio::fs::metadata(root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(ConversionError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut files: Vec<PathBuf> = Vec::new();
        let mut dirs_to_visit = vec![root.to_path_buf()];

        while let Some(current_dir) = dirs_to_visit.pop() {
            let mut entries = match tokio::fs::read_dir(&current_dir).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(
                        dir = %current_dir.display(),
                        error = %e,
                        "Failed to read directory, skipping"
                    );
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(
                            dir = %current_dir.display(),
                            error = %e,
                            "Failed to list directory entry, skipping rest of directory"
                        );
                        break;
                    }
                };
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to stat entry, skipping");
                        continue;
                    }
                };
                if file_type.is_dir() {
                    dirs_to_visit.push(path);
                } else if self.selects(&path) {
                    files.push(path);
                }
            }
        }

        files.sort();
        debug!(
            root = %root.display(),
            count = files.len(),
            mode = ?self.mode,
            "Scan files discovered"
        );

        let mut requests = Vec::with_capacity(files.len());
        for path in files {
            match ConversionRequest::for_input(path, &self.output_extension) {
                Ok(request) => requests.push(request),
                Err(e) => warn!(error = %e, "Skipping file"),
            }
        }

        info!(root = %root.display(), count = requests.len(), "Conversion requests prepared");
        Ok(requests)
    }
}
