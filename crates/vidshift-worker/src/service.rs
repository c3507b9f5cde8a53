//! Job service facade used by hosts.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;
use vidshift_media::{FrameProcessor, TranscodeEngine};
use vidshift_models::{JobEvent, JobId, JobOutcome, JobRecord, TransformOptions};
use vidshift_store::JobStore;

use crate::config::ServiceConfig;
use crate::error::{JobError, JobResult};
use crate::metrics;
use crate::pipeline::{Pipeline, PipelineJob};
use crate::registry::JobRegistry;
use crate::reporter::{ProgressBroadcaster, ProgressReporter};
use crate::retention::{RetentionManager, RetentionReport};

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Signal delivered and the cancelled state recorded
    Accepted,
    /// No live job with that id, or it already reached a terminal state
    NotFound,
}

/// Entry point for submitting, observing and cancelling jobs.
pub struct JobService {
    config: ServiceConfig,
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    reporter: Arc<ProgressReporter>,
    retention: Arc<RetentionManager>,
    pipeline: Arc<Pipeline>,
}

impl JobService {
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn JobStore>,
        engine: Arc<dyn TranscodeEngine>,
        frames: Arc<dyn FrameProcessor>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let broadcaster = ProgressBroadcaster::new(config.progress_channel_capacity);
        let reporter = Arc::new(ProgressReporter::new(store.clone(), registry.clone(), broadcaster));
        let retention = Arc::new(RetentionManager::new(
            config.storage_dirs().into_iter().map(PathBuf::from).collect(),
            store.clone(),
            registry.clone(),
        ));
        let pipeline = Arc::new(Pipeline::new(
            engine,
            frames,
            reporter.clone(),
            retention.clone(),
            config.max_stored_videos,
        ));

        Self {
            config,
            store,
            registry,
            reporter,
            retention,
            pipeline,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Save uploaded bytes as `{id}_{filename}` and submit the job.
    pub async fn accept_upload(&self, filename: &str, options: TransformOptions, bytes: &[u8]) -> JobResult<JobId> {
        let filename = self.check_upload_name(filename)?;
        if bytes.is_empty() {
            return Err(JobError::upload_rejected("Uploaded file is empty"));
        }
        if bytes.len() as u64 > self.config.max_upload_bytes {
            return Err(JobError::upload_rejected(format!(
                "File exceeds the {} byte upload limit",
                self.config.max_upload_bytes
            )));
        }
        options.validate()?;

        let id = JobId::new();
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        let source = self.config.upload_path_for(&id, &filename);
        tokio::fs::write(&source, bytes).await?;

        self.start(id, filename, options, source).await
    }

    /// Submit an upload already saved at `source`.
    pub async fn submit(&self, filename: &str, options: TransformOptions, source: PathBuf) -> JobResult<JobId> {
        let filename = self.check_upload_name(filename)?;
        options.validate()?;
        self.start(JobId::new(), filename, options, source).await
    }

    async fn start(&self, id: JobId, filename: String, options: TransformOptions, source: PathBuf) -> JobResult<JobId> {
        let record = JobRecord::new(id.clone(), filename.clone(), options.clone());
        self.store.create(&record).await?;
        metrics::record_job_submitted();
        info!(job_id = %id, filename = %filename, "Job submitted");

        // Registered first so retention protects the new upload
        let destination = self.config.output_path_for(&id, &filename);
        let cancel = self
            .registry
            .register_with_files(&id, filename.clone(), vec![source.clone(), destination.clone()])
            .await;
        self.retention.enforce(self.config.max_stored_videos).await;

        if let Err(e) = tokio::fs::create_dir_all(&self.config.processed_dir).await {
            let err = JobError::from(e);
            self.reporter
                .finalize(&id, JobOutcome::Failed { error: err.to_string() })
                .await;
            return Err(err);
        }

        let job = PipelineJob {
            job_id: id.clone(),
            destination,
            original_filename: filename,
            source,
            options,
        };

        let handle = self.pipeline.spawn(job, cancel);
        self.registry.attach(&id, handle).await;
        Ok(id)
    }

    /// Current record of a job.
    pub async fn get_status(&self, id: &JobId) -> JobResult<JobRecord> {
        Ok(self.store.read(id).await?)
    }

    /// Signal a live job to stop and record it as cancelled.
    ///
    /// A job whose terminal state was written first reports `NotFound`.
    pub async fn request_cancel(&self, id: &JobId) -> CancelOutcome {
        if !self.registry.signal_cancel(id).await {
            return CancelOutcome::NotFound;
        }

        info!(job_id = %id, "Cancellation requested");
        if self.reporter.finalize(id, JobOutcome::Cancelled).await {
            CancelOutcome::Accepted
        } else {
            info!(job_id = %id, "Job finished before the cancellation was recorded");
            CancelOutcome::NotFound
        }
    }

    /// Realtime events of every job; observers filter by job id.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.reporter.broadcaster().subscribe()
    }

    /// Run a retention pass with the configured limit.
    pub async fn enforce_retention(&self) -> RetentionReport {
        self.retention.enforce(self.config.max_stored_videos).await
    }

    fn check_upload_name(&self, filename: &str) -> JobResult<String> {
        let name = upload_file_name(filename).ok_or_else(|| JobError::upload_rejected("No file selected"))?;
        if !self.config.is_allowed(&name) {
            return Err(JobError::upload_rejected(format!(
                "File type not allowed: {} (allowed: {})",
                name,
                self.config.allowed_extensions.join(", ")
            )));
        }
        Ok(name)
    }
}

/// Last path component of a client-supplied file name.
///
/// Rejects blank names and names that would resolve outside the folder.
pub fn upload_file_name(filename: &str) -> Option<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}
