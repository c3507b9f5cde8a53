//! Job lifecycle and transformation pipeline.
//!
//! This crate provides:
//! - The job registry (cancellation signals for live jobs)
//! - Progress reporting to the store and realtime observers
//! - The staged transformation pipeline
//! - Retention of uploaded and processed files
//! - The `JobService` facade used by hosts

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod reporter;
pub mod retention;
pub mod service;

pub use config::ServiceConfig;
pub use error::{JobError, JobResult};
pub use logging::JobLogger;
pub use pipeline::{Pipeline, PipelineJob, StagePlan, TempArtifacts};
pub use registry::{ActiveJob, CancellationToken, JobRegistry};
pub use reporter::{progress, ProgressBroadcaster, ProgressReporter};
pub use retention::{RetentionManager, RetentionReport};
pub use service::{CancelOutcome, JobService};
