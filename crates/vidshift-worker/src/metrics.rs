//! Job metrics.

use metrics::{counter, histogram};
use vidshift_models::JobStatus;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "vidshift_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vidshift_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vidshift_jobs_failed_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "vidshift_jobs_cancelled_total";
    pub const RETENTION_DELETED_TOTAL: &str = "vidshift_retention_deleted_total";
    pub const STAGE_DURATION_SECONDS: &str = "vidshift_stage_duration_seconds";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record a terminal status.
pub fn record_job_finished(status: JobStatus) {
    match status {
        JobStatus::Completed => counter!(names::JOBS_COMPLETED_TOTAL).increment(1),
        JobStatus::Failed => counter!(names::JOBS_FAILED_TOTAL).increment(1),
        JobStatus::Cancelled => counter!(names::JOBS_CANCELLED_TOTAL).increment(1),
        JobStatus::Queued | JobStatus::Processing => {}
    }
}

pub fn record_retention_deleted(count: usize) {
    if count > 0 {
        counter!(names::RETENTION_DELETED_TOTAL).increment(count as u64);
    }
}

pub fn record_stage_duration(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}
