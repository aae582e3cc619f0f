//! Staging-directory management. Each user gets an isolated directory under
//! the staging root; it exists only while that user has an open session.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one user's staged files. Not created until the first
    /// `write`.
    pub fn user_dir(&self, user_id: i64) -> PathBuf {
        self.root.join(user_id.to_string())
    }

    /// Persists bytes under the user's directory, creating it on first use.
    pub fn write(&self, user_id: i64, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.user_dir(user_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create staging directory {}", dir.display()))?;
        let path = dir.join(file_name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write staged file {}", path.display()))?;
        Ok(path)
    }

    /// Removes one staged file. Absent files are not an error.
    pub fn remove_file(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove staged file {}: {e}", path.display());
            }
        }
    }

    /// Removes the user's whole staging directory, staged files and any
    /// output artifact included. Absent directories are not an error.
    pub fn remove_user_dir(&self, user_id: i64) {
        let dir = self.user_dir(user_id);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove staging directory {}: {e}", dir.display());
            }
        }
    }
}
