//! Job record, lifecycle status and partial updates.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::TransformOptions;

/// Message written when a job is created.
pub const QUEUED_MESSAGE: &str = "Job queued for processing";
/// Message written when a job completes.
pub const COMPLETED_MESSAGE: &str = "Processing completed successfully!";
/// Message written when a job fails.
pub const FAILED_MESSAGE: &str = "Processing failed";
/// Message written when a job is cancelled.
pub const CANCELLED_MESSAGE: &str = "Job cancelled by user";
/// Error recorded on a cancelled job.
pub const CANCELLED_ERROR: &str = "Processing cancelled by user";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job accepted, pipeline not started yet
    #[default]
    Queued,
    /// Pipeline is running
    Processing,
    /// Output produced and validated
    Completed,
    /// Pipeline aborted with an error
    Failed,
    /// Cancelled on request
    Cancelled,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the job still owns files on disk that must not be reclaimed.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Unique job ID
    pub id: JobId,
    /// Original uploaded file name
    pub filename: String,
    /// Requested transformation
    pub options: TransformOptions,
    /// Current status
    pub status: JobStatus,
    /// Progress (0-100)
    pub progress: u8,
    /// Current stage description
    pub message: String,
    /// Output file name (set on completion)
    pub output_filename: Option<String>,
    /// Error message (set on failure or cancellation)
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Terminal transition timestamp
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a queued job record.
    pub fn new(id: JobId, filename: impl Into<String>, options: TransformOptions) -> Self {
        Self {
            id,
            filename: filename.into(),
            options,
            status: JobStatus::Queued,
            progress: 0,
            message: QUEUED_MESSAGE.to_string(),
            output_filename: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update.
    pub fn apply(&mut self, patch: &JobPatch) {
        patch.merge_into(self);
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Output produced
    Completed { output_filename: String },
    /// Pipeline failed
    Failed { error: String },
    /// Cancelled on request
    Cancelled,
}

impl JobOutcome {
    /// Terminal status for this outcome.
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        }
    }

    pub fn output_filename(&self) -> Option<&str> {
        match self {
            JobOutcome::Completed { output_filename } => Some(output_filename),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Failed { error } => Some(error),
            JobOutcome::Cancelled => Some(CANCELLED_ERROR),
            JobOutcome::Completed { .. } => None,
        }
    }
}

/// Partial update of a job record.
///
/// Only fields that are `Some` are written; everything else is left as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// Progress and stage message.
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress.min(100)),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Progress, stage message and a status change.
    pub fn progress_with_status(progress: u8, message: impl Into<String>, status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::progress(progress, message)
        }
    }

    /// Terminal write for an outcome.
    pub fn terminal(outcome: &JobOutcome) -> Self {
        let (progress, message) = match outcome {
            JobOutcome::Completed { .. } => (100, COMPLETED_MESSAGE),
            JobOutcome::Failed { .. } => (0, FAILED_MESSAGE),
            JobOutcome::Cancelled => (0, CANCELLED_MESSAGE),
        };

        Self {
            status: Some(outcome.status()),
            progress: Some(progress),
            message: Some(message.to_string()),
            output_filename: outcome.output_filename().map(str::to_string),
            error: outcome.error().map(str::to_string),
            completed_at: Some(Utc::now()),
        }
    }

    /// Whether this patch moves the job into a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }

    /// Whether nothing would be written.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge the set fields into a record.
    pub fn merge_into(&self, record: &mut JobRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(progress) = self.progress {
            record.progress = progress;
        }
        if let Some(ref message) = self.message {
            record.message = message.clone();
        }
        if let Some(ref output) = self.output_filename {
            record.output_filename = Some(output.clone());
        }
        if let Some(ref error) = self.error {
            record.error = Some(error.clone());
        }
        if let Some(completed_at) = self.completed_at {
            record.completed_at = Some(completed_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_record_creation() {
        let record = JobRecord::new(JobId::new(), "clip.mp4", TransformOptions::default());
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.progress, 0);
        assert_eq!(record.message, QUEUED_MESSAGE);
        assert!(record.output_filename.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_patch_merges_only_set_fields() {
        let mut record = JobRecord::new(JobId::new(), "clip.mp4", TransformOptions::default());
        record.apply(&JobPatch::progress(40, "Muxing audio and video..."));

        assert_eq!(record.progress, 40);
        assert_eq!(record.message, "Muxing audio and video...");
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.filename, "clip.mp4");
    }

    #[test]
    fn test_terminal_patches() {
        let completed = JobPatch::terminal(&JobOutcome::Completed {
            output_filename: "processed_x.mp4".into(),
        });
        assert_eq!(completed.status, Some(JobStatus::Completed));
        assert_eq!(completed.progress, Some(100));
        assert!(completed.error.is_none());
        assert!(completed.is_terminal());

        let failed = JobPatch::terminal(&JobOutcome::Failed { error: "boom".into() });
        assert_eq!(failed.progress, Some(0));
        assert!(failed.output_filename.is_none());
        assert_eq!(failed.error.as_deref(), Some("boom"));

        let cancelled = JobPatch::terminal(&JobOutcome::Cancelled);
        assert_eq!(cancelled.status, Some(JobStatus::Cancelled));
        assert_eq!(cancelled.message.as_deref(), Some(CANCELLED_MESSAGE));
        assert!(cancelled.completed_at.is_some());
    }

    #[test]
    fn test_status_helpers() {
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Queued.is_active());
        assert_eq!(JobStatus::parse("failed"), Some(JobStatus::Failed));
        assert_eq!(JobStatus::parse("stale"), None);
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
