//! Registry of live jobs and their cancellation signals.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use vidshift_models::JobId;

/// One-way cancellation signal observed by a pipeline.
///
/// Once set it is never cleared, even after the job leaves the registry.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is signalled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without a signal: never resolves
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A job currently tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub id: JobId,
    pub filename: String,
    /// Input and output locations the job reads or writes
    pub files: Vec<PathBuf>,
}

#[derive(Debug)]
struct RegistryEntry {
    cancel: watch::Sender<bool>,
    filename: String,
    files: Vec<PathBuf>,
    handle: Option<JoinHandle<()>>,
}

/// In-process map from job id to its cancellation signal and task handle.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, RegistryEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a job and hand out its cancellation token.
    pub async fn register(&self, id: &JobId, filename: impl Into<String>) -> CancellationToken {
        self.register_with_files(id, filename, Vec::new()).await
    }

    /// Track a job together with the files it owns.
    pub async fn register_with_files(
        &self,
        id: &JobId,
        filename: impl Into<String>,
        files: Vec<PathBuf>,
    ) -> CancellationToken {
        let (cancel, rx) = watch::channel(false);
        self.jobs.write().await.insert(
            id.clone(),
            RegistryEntry {
                cancel,
                filename: filename.into(),
                files,
                handle: None,
            },
        );
        CancellationToken { rx }
    }

    /// Store the task handle. Ignored if the job already left the registry.
    pub async fn attach(&self, id: &JobId, handle: JoinHandle<()>) {
        if let Some(entry) = self.jobs.write().await.get_mut(id) {
            entry.handle = Some(handle);
        }
    }

    /// Set the job's cancellation signal. `false` if the job is not tracked.
    pub async fn signal_cancel(&self, id: &JobId) -> bool {
        match self.jobs.read().await.get(id) {
            Some(entry) => {
                entry.cancel.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Stop tracking a job. The task itself is left running.
    pub async fn deregister(&self, id: &JobId) {
        self.jobs.write().await.remove(id);
    }

    pub async fn is_registered(&self, id: &JobId) -> bool {
        self.jobs.read().await.contains_key(id)
    }

    pub async fn active_jobs(&self) -> Vec<ActiveJob> {
        self.jobs
            .read()
            .await
            .iter()
            .map(|(id, entry)| ActiveJob {
                id: id.clone(),
                filename: entry.filename.clone(),
                files: entry.files.clone(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
