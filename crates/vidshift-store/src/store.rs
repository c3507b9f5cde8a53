//! Store trait and backend selection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use vidshift_models::{JobId, JobPatch, JobRecord};

use crate::error::StoreResult;
use crate::memory::InMemoryJobStore;
use crate::redis_store::RedisJobStore;

/// Result of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Patch merged into the record
    Applied,
    /// Record was already terminal; nothing changed
    Rejected,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied)
    }
}

/// Persistent mapping from job id to job record.
///
/// Updates are partial merges, atomic per id. Once a terminal status is
/// stored the record is frozen: later updates return `Rejected`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails with `DuplicateJob` if the id exists.
    async fn create(&self, record: &JobRecord) -> StoreResult<()>;

    /// Read the full record.
    async fn read(&self, id: &JobId) -> StoreResult<JobRecord>;

    /// Merge the set fields of `patch` into the record.
    async fn update(&self, id: &JobId, patch: &JobPatch) -> StoreResult<UpdateOutcome>;

    /// Connectivity check.
    async fn ping(&self) -> StoreResult<()>;

    /// Backend name for logs and readiness output.
    fn backend_name(&self) -> &'static str;
}

/// Connect to Redis, falling back to in-memory storage when it is unreachable.
///
/// The choice is made once; callers keep the returned store for the process
/// lifetime.
pub async fn connect_job_store(redis_url: &str) -> Arc<dyn JobStore> {
    let redis = match RedisJobStore::new(redis_url) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Redis not available, using in-memory job storage");
            return Arc::new(InMemoryJobStore::new());
        }
    };

    match redis.ping().await {
        Ok(()) => {
            info!("Connected to Redis job storage");
            Arc::new(redis)
        }
        Err(e) => {
            warn!(error = %e, "Redis not available, using in-memory job storage");
            Arc::new(InMemoryJobStore::new())
        }
    }
}
