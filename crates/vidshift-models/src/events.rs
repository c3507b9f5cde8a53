//! Realtime event types pushed to observers of a job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobOutcome, JobRecord, JobStatus};

/// Event envelope broadcast over the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Progress checkpoint reached
    ProgressUpdate {
        job_id: JobId,
        progress: u8,
        message: String,
        status: JobStatus,
    },

    /// Job reached a terminal state
    JobCompleted {
        job_id: JobId,
        status: JobStatus,
        output_filename: Option<String>,
        error: Option<String>,
    },
}

impl JobEvent {
    /// Create a progress update.
    pub fn progress(job_id: &JobId, progress: u8, message: impl Into<String>, status: JobStatus) -> Self {
        JobEvent::ProgressUpdate {
            job_id: job_id.clone(),
            progress: progress.min(100),
            message: message.into(),
            status,
        }
    }

    /// Create a completion event from a terminal outcome.
    pub fn completed(job_id: &JobId, outcome: &JobOutcome) -> Self {
        JobEvent::JobCompleted {
            job_id: job_id.clone(),
            status: outcome.status(),
            output_filename: outcome.output_filename().map(str::to_string),
            error: outcome.error().map(str::to_string),
        }
    }

    /// Snapshot of a record as a progress update (sent to late joiners).
    pub fn snapshot(record: &JobRecord) -> Self {
        JobEvent::ProgressUpdate {
            job_id: record.id.clone(),
            progress: record.progress,
            message: record.message.clone(),
            status: record.status,
        }
    }

    /// Job this event belongs to.
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::ProgressUpdate { job_id, .. } | JobEvent::JobCompleted { job_id, .. } => job_id,
        }
    }

    /// Event name on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            JobEvent::ProgressUpdate { .. } => "progress_update",
            JobEvent::JobCompleted { .. } => "job_completed",
        }
    }
}
