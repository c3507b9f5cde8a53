//! FFmpeg CLI wrapper and raw-frame processing.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building (multi-input, stream mapping)
//! - The `TranscodeEngine` seam and its FFmpeg-backed runner
//! - FFprobe inspection (dimensions, frame rate, audio presence)
//! - Filter graph construction from transformation options
//! - Frame-granular decode/encode through the `FrameProcessor` seam
//! - Per-frame pixel kernels (blur, sharpen, edge detection)

pub mod command;
pub mod engine;
pub mod error;
pub mod filters;
pub mod frames;
pub mod kernels;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use engine::TranscodeEngine;
pub use error::{MediaError, MediaResult};
pub use filters::{atempo_chain, build_filter_graph, setpts_filter};
pub use frames::{FfmpegFrameProcessor, Frame, FrameFormat, FrameProcessor, FrameSink, FrameSource};
pub use kernels::apply_frame_filter;
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
