//! Temporary files owned by a running job.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Files a job created and must remove when it ends.
///
/// Files are removed in creation order by [`TempArtifacts::cleanup`]; any
/// that remain when the value is dropped (panic, early return) are removed
/// synchronously.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a path. Duplicates are ignored.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        if !self.paths.contains(&path) {
            self.paths.push(path.clone());
        }
        path
    }

    /// Stop tracking a path (consumed or promoted to final output).
    pub fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Delete a tracked file now and stop tracking it.
    pub async fn remove(&mut self, path: &Path) {
        self.release(path);
        remove_file(path).await;
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete every tracked file. Missing files are skipped.
    pub async fn cleanup(&mut self) {
        for path in std::mem::take(&mut self.paths) {
            remove_file(&path).await;
        }
    }
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
                }
            }
        }
    }
}
