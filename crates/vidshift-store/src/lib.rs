//! Job record store.
//!
//! This crate provides:
//! - The `JobStore` trait (create, read, atomic partial update)
//! - A Redis hash backend shared across processes
//! - An in-memory fallback used when Redis is unreachable at startup

pub mod error;
pub mod fields;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryJobStore;
pub use redis_store::RedisJobStore;
pub use store::{connect_job_store, JobStore, UpdateOutcome};
