//! Store error types.

use thiserror::Error;
use vidshift_models::JobId;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Corrupt job record {id}: {reason}")]
    Corrupt { id: JobId, reason: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn corrupt(id: &JobId, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
