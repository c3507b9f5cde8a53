//! Redis hash backend.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use tracing::debug;
use vidshift_models::{JobId, JobPatch, JobRecord};

use crate::error::{StoreError, StoreResult};
use crate::fields::{flatten, parse_record, patch_fields, record_fields};
use crate::store::{JobStore, UpdateOutcome};

/// Key prefix for job hashes.
pub const JOB_KEY_PREFIX: &str = "job:";

/// Claim the key and write all fields, or fail if it exists.
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

/// Merge fields unless the record is missing (-1) or terminal (0).
const UPDATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
local status = redis.call('HGET', KEYS[1], 'status')
if status == 'completed' or status == 'failed' or status == 'cancelled' then
  return 0
end
if #ARGV > 0 then
  redis.call('HSET', KEYS[1], unpack(ARGV))
end
return 1
"#;

/// Job store backed by one Redis hash per job.
pub struct RedisJobStore {
    client: redis::Client,
    create_script: Script,
    update_script: Script,
}

impl RedisJobStore {
    /// Create a store client. No connection is made until first use.
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            create_script: Script::new(CREATE_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
        })
    }

    fn key(id: &JobId) -> String {
        format!("{}{}", JOB_KEY_PREFIX, id)
    }

    /// Remove a job hash. Used by tests and maintenance tooling.
    pub async fn delete(&self, id: &JobId) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(Self::key(id)).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, record: &JobRecord) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let args = flatten(&record_fields(record)?);

        let created: i32 = self
            .create_script
            .key(Self::key(&record.id))
            .arg(args)
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            return Err(StoreError::DuplicateJob(record.id.clone()));
        }

        debug!(job_id = %record.id, "Created job record");
        Ok(())
    }

    async fn read(&self, id: &JobId) -> StoreResult<JobRecord> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let map: HashMap<String, String> = conn.hgetall(Self::key(id)).await?;

        if map.is_empty() {
            return Err(StoreError::NotFound(id.clone()));
        }

        parse_record(id, map)
    }

    async fn update(&self, id: &JobId, patch: &JobPatch) -> StoreResult<UpdateOutcome> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let args = flatten(&patch_fields(patch));

        let result: i32 = self
            .update_script
            .key(Self::key(id))
            .arg(args)
            .invoke_async(&mut conn)
            .await?;

        match result {
            -1 => Err(StoreError::NotFound(id.clone())),
            0 => Ok(UpdateOutcome::Rejected),
            _ => Ok(UpdateOutcome::Applied),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
