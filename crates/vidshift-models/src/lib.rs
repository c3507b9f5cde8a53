//! Shared data models for the vidshift job service.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and partial updates
//! - Transformation options submitted with an upload
//! - Realtime event schemas pushed to observers

pub mod events;
pub mod job;
pub mod options;

// Re-export common types
pub use events::JobEvent;
pub use job::{JobId, JobOutcome, JobPatch, JobRecord, JobStatus};
pub use options::{FrameFilter, OptionsError, RawOptions, TransformOptions, Transformation};
