//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Diagnostics FFmpeg prints when a mapped audio stream does not exist.
const MISSING_AUDIO_MARKERS: &[&str] = &[
    "matches no streams",
    "Cannot select audio stream",
    "does not contain any stream",
];

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Could not open video file: {0}")]
    FrameSourceOpen(String),

    #[error("Frame writer failed to open: {0}")]
    FrameSinkOpen(String),

    #[error("Frame write failed: {0}")]
    FrameWrite(String),

    #[error("Frame decode failed: {0}")]
    FrameRead(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a frame source open failure.
    pub fn source_open(message: impl Into<String>) -> Self {
        Self::FrameSourceOpen(message.into())
    }

    /// Create a frame sink open failure.
    pub fn sink_open(message: impl Into<String>) -> Self {
        Self::FrameSinkOpen(message.into())
    }

    /// Create a frame write failure.
    pub fn frame_write(message: impl Into<String>) -> Self {
        Self::FrameWrite(message.into())
    }

    /// Create a frame decode failure.
    pub fn frame_read(message: impl Into<String>) -> Self {
        Self::FrameRead(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Diagnostic output captured from the external tool, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref().filter(|s| !s.trim().is_empty())
            }
            _ => None,
        }
    }

    /// Whether FFmpeg failed because the requested audio stream does not exist.
    pub fn is_missing_audio(&self) -> bool {
        self.diagnostics()
            .map(|d| MISSING_AUDIO_MARKERS.iter().any(|m| d.contains(m)))
            .unwrap_or(false)
    }
}
