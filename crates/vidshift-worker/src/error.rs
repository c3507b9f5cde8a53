//! Job error taxonomy.

use thiserror::Error;
use vidshift_media::MediaError;
use vidshift_models::{JobId, OptionsError};
use vidshift_store::StoreError;

pub type JobResult<T> = Result<T, JobError>;

/// Engine call contexts, used as the prefix of the recorded error.
pub mod context {
    pub const TRANSFORM: &str = "FFmpeg processing error";
    pub const FINAL_ENCODE: &str = "Final encoding error";
    pub const SPEED: &str = "Speed adjustment error";
    pub const COPY: &str = "Video copy error";
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),

    #[error("Job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("{context}: {detail}")]
    EngineFailure { context: &'static str, detail: String },

    #[error("Could not open video file: {0}")]
    FrameProcessorOpenFailure(String),

    #[error("Frame processing failed: {0}")]
    FrameProcessorWriteFailure(String),

    #[error("{0}")]
    OutputValidationFailure(String),

    #[error("Processing cancelled by user")]
    CancellationRequested,

    #[error("Unexpected error: {0}")]
    UnexpectedFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    pub fn upload_rejected(msg: impl Into<String>) -> Self {
        Self::UploadRejected(msg.into())
    }

    pub fn output_invalid(msg: impl Into<String>) -> Self {
        Self::OutputValidationFailure(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Engine failure carrying the engine's diagnostics when it produced any.
    pub fn engine(context: &'static str, err: &MediaError) -> Self {
        let detail = err
            .diagnostics()
            .map(|d| d.trim().to_string())
            .unwrap_or_else(|| err.to_string());
        Self::EngineFailure { context, detail }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, JobError::CancellationRequested)
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_rejection(&self) -> bool {
        matches!(self, JobError::UploadRejected(_) | JobError::InvalidOptions(_))
    }
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateJob(id) => JobError::DuplicateJob(id),
            StoreError::NotFound(id) => JobError::NotFound(id),
            other => JobError::Store(other),
        }
    }
}

impl From<MediaError> for JobError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::FrameSourceOpen(msg) => JobError::FrameProcessorOpenFailure(msg),
            MediaError::FrameSinkOpen(msg) | MediaError::FrameWrite(msg) => JobError::FrameProcessorWriteFailure(msg),
            MediaError::FrameRead(_) => JobError::FrameProcessorWriteFailure(err.to_string()),
            MediaError::Io(e) => JobError::Io(e),
            other => JobError::engine(context::TRANSFORM, &other),
        }
    }
}
