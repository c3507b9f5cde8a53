//! Transcode engine seam.

use async_trait::async_trait;

use crate::command::FfmpegCommand;
use crate::error::MediaResult;

/// Executes a built FFmpeg command to completion.
///
/// Failures carry the engine's diagnostic output (see [`crate::MediaError::diagnostics`]).
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()>;
}
