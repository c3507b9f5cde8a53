//! Retention of uploaded and processed videos.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};
use vidshift_store::JobStore;

use crate::metrics;
use crate::registry::{ActiveJob, JobRegistry};

/// Extensions retention treats as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv"];

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Files deleted
    pub deleted: Vec<PathBuf>,
    /// Files kept because a live job owns them
    pub protected: usize,
    /// Deletions that failed
    pub failures: usize,
}

/// Keeps the storage folders within a bounded number of videos.
///
/// Each folder keeps its `max_files` most recently modified videos; files
/// belonging to queued or processing jobs are never touched and do not count
/// toward the limit.
pub struct RetentionManager {
    dirs: Vec<PathBuf>,
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    modified: SystemTime,
}

impl RetentionManager {
    pub fn new(dirs: Vec<PathBuf>, store: Arc<dyn JobStore>, registry: Arc<JobRegistry>) -> Self {
        Self { dirs, store, registry }
    }

    /// Delete the oldest videos beyond `max_files` per folder. Never fails.
    pub async fn enforce(&self, max_files: usize) -> RetentionReport {
        let protection = Protection::from_jobs(self.protected_jobs().await);
        let mut report = RetentionReport::default();

        for dir in &self.dirs {
            let dir = dir.clone();
            let protection = protection.clone();
            let scan = tokio::task::spawn_blocking(move || scan_folder(&dir, &protection)).await;

            let (mut candidates, protected) = match scan {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Retention scan failed");
                    continue;
                }
            };
            report.protected += protected;

            // Newest first
            candidates.sort_by(|a, b| b.modified.cmp(&a.modified));

            for candidate in candidates.into_iter().skip(max_files) {
                match tokio::fs::remove_file(&candidate.path).await {
                    Ok(()) => {
                        info!(path = %candidate.path.display(), "Deleted old video");
                        report.deleted.push(candidate.path);
                    }
                    Err(e) => {
                        warn!(path = %candidate.path.display(), error = %e, "Failed to delete old video");
                        report.failures += 1;
                    }
                }
            }
        }

        metrics::record_retention_deleted(report.deleted.len());
        debug!(
            deleted = report.deleted.len(),
            protected = report.protected,
            failures = report.failures,
            "Retention pass finished"
        );
        report
    }

    /// Registered jobs whose stored status is still active.
    async fn protected_jobs(&self) -> Vec<ActiveJob> {
        let mut jobs = Vec::new();
        for job in self.registry.active_jobs().await {
            match self.store.read(&job.id).await {
                Ok(record) if record.status.is_active() => jobs.push(job),
                Ok(_) => {}
                Err(e) => {
                    // Unknown state: keep its files
                    warn!(job_id = %job.id, error = %e, "Could not read job during retention");
                    jobs.push(job);
                }
            }
        }
        jobs
    }
}

/// Files retention must not touch: names carrying a live job id, and the
/// exact paths live jobs read or write.
#[derive(Debug, Clone, Default)]
struct Protection {
    ids: Vec<String>,
    paths: Vec<PathBuf>,
}

impl Protection {
    fn from_jobs(jobs: Vec<ActiveJob>) -> Self {
        let mut protection = Self::default();
        for job in jobs {
            protection.ids.push(job.id.as_str().to_string());
            protection.paths.extend(job.files);
        }
        protection
    }

    /// Same protection with every path in canonical form.
    fn resolved(&self) -> Self {
        Self {
            ids: self.ids.clone(),
            paths: self.paths.iter().map(|p| normalize(p)).collect(),
        }
    }

    /// Expects `self` to be resolved.
    fn covers(&self, name: &str, path: &Path) -> bool {
        if self.ids.iter().any(|id| name.contains(id.as_str())) {
            return true;
        }
        let path = normalize(path);
        self.paths.iter().any(|p| *p == path)
    }
}

/// Canonical form when the file exists, the path itself otherwise.
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Video files in `dir` eligible for deletion, plus the count of protected ones.
fn scan_folder(dir: &Path, protection: &Protection) -> (Vec<Candidate>, usize) {
    let protection = protection.resolved();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return (Vec::new(), 0),
    };

    let mut candidates = Vec::new();
    let mut protected = 0;

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !is_video(&name) {
            continue;
        }

        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }

        if protection.covers(&name, &entry.path()) {
            protected += 1;
            continue;
        }

        candidates.push(Candidate {
            path: entry.path(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    (candidates, protected)
}

fn is_video(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
