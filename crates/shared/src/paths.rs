//! File path utilities for organizing data files.
//!
//! Centralizes the directories the catalog writes to under the data root.

use std::path::{Path, PathBuf};

/// File path manager for data files
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Create a new DataPaths with the given root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create all necessary directories
    ///
    /// `extra` lists directories resolved from configuration that may live
    /// outside the data root (absolute storage or log paths).
    pub fn create_dirs(&self, extra: &[&Path]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.logs_dir())?;

        for dir in extra {
            std::fs::create_dir_all(dir)?;
        }

        Ok(())
    }
}
