//! In-memory job store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vidshift_models::{JobId, JobPatch, JobRecord};

use crate::error::{StoreError, StoreResult};
use crate::store::{JobStore, UpdateOutcome};

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, record: &JobRecord) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&record.id) {
            return Err(StoreError::DuplicateJob(record.id.clone()));
        }
        jobs.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn read(&self, id: &JobId) -> StoreResult<JobRecord> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &JobId, patch: &JobPatch) -> StoreResult<UpdateOutcome> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if record.is_terminal() {
            return Ok(UpdateOutcome::Rejected);
        }

        patch.merge_into(record);
        Ok(UpdateOutcome::Applied)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
