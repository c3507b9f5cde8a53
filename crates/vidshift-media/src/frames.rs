//! Frame-granular decode and encode.
//!
//! A [`FrameProcessor`] opens a [`FrameSource`] yielding RGB frames in
//! presentation order and creates a [`FrameSink`] that encodes frames into a
//! new file. The FFmpeg-backed implementation streams raw `rgb24` frames
//! through pipes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::command::MAX_DIAGNOSTIC_LINES;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, DEFAULT_FPS};

/// A decoded RGB frame.
pub type Frame = image::RgbImage;

/// Geometry and timing of a frame stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    /// Frames per second (never zero)
    pub fps: f64,
    /// Total frame count, 0 when unknown
    pub total_frames: u64,
}

impl FrameFormat {
    pub fn new(width: u32, height: u32, fps: f64, total_frames: u64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { DEFAULT_FPS };
        Self {
            width,
            height,
            fps,
            total_frames,
        }
    }

    /// Bytes in one packed RGB frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Sequential reader of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    fn format(&self) -> FrameFormat;

    /// Next frame, `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Release the underlying decoder.
    async fn close(&mut self) -> MediaResult<()>;
}

/// Sequential writer of frames into an encoded file.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and close the output file.
    async fn finish(&mut self) -> MediaResult<()>;
}

/// Opens frame sources and creates frame sinks.
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>>;

    async fn create_sink(&self, path: &Path, format: &FrameFormat) -> MediaResult<Box<dyn FrameSink>>;
}

/// FFmpeg-backed frame processor using raw `rgb24` pipes.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameProcessor;

impl FfmpegFrameProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameProcessor for FfmpegFrameProcessor {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        let info = probe_video(path)
            .await
            .map_err(|e| MediaError::source_open(format!("{}: {}", path.display(), e)))?;

        if info.width == 0 || info.height == 0 {
            return Err(MediaError::source_open(format!(
                "{}: video stream has no dimensions",
                path.display()
            )));
        }

        let format = FrameFormat::new(info.width, info.height, info.fps, info.estimated_frames());

        debug!(
            path = %path.display(),
            width = format.width,
            height = format.height,
            fps = format.fps,
            "Opening frame source"
        );

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-noautorotate", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);

        let source = FfmpegFrameSource::spawn(cmd, format)
            .map_err(|e| MediaError::source_open(format!("{}: {}", path.display(), e)))?;
        Ok(Box::new(source))
    }

    async fn create_sink(&self, path: &Path, format: &FrameFormat) -> MediaResult<Box<dyn FrameSink>> {
        let size = format!("{}x{}", format.width, format.height);
        let fps = format!("{}", format.fps);

        let mut child = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &size, "-r", &fps, "-i", "-"])
            .args(["-c:v", "mpeg4", "-vtag", "xvid", "-q:v", "3"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::sink_open(format!("{}: {}", path.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::sink_open("encoder stdin not captured"))?;

        let stderr_task = child.stderr.take().map(stderr_tail);

        Ok(Box::new(FfmpegFrameSink {
            child,
            stdin: Some(stdin),
            stderr_task,
            format: *format,
            path: path.to_path_buf(),
        }))
    }
}

/// Keep the last diagnostic lines a child writes to stderr.
fn stderr_tail(stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            if tail.len() == MAX_DIAGNOSTIC_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail).join("\n")
    })
}

struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<String>>,
    format: FrameFormat,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Start a decoder writing packed `rgb24` frames to stdout.
    fn spawn(mut cmd: Command, format: FrameFormat) -> std::io::Result<Self> {
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("decoder stdout not captured"))?;
        let stderr_task = child.stderr.take().map(stderr_tail);

        Ok(Self {
            child,
            stdout,
            stderr_task,
            format,
            finished: false,
        })
    }

    /// End of stream. A decoder that exited non-zero truncated its input.
    async fn check_exit(&mut self) -> MediaResult<()> {
        let status = self.child.wait().await?;
        let diagnostics = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            return Ok(());
        }

        let mut message = format!("decoder exited with status {}", status.code().unwrap_or(-1));
        if !diagnostics.trim().is_empty() {
            message.push_str(": ");
            message.push_str(diagnostics.trim());
        }
        Err(MediaError::frame_read(message))
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn format(&self) -> FrameFormat {
        self.format
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.format.frame_len()];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // A trailing partial frame is dropped
                self.finished = true;
                self.check_exit().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        Frame::from_raw(self.format.width, self.format.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::internal("decoded frame size mismatch"))
    }

    async fn close(&mut self) -> MediaResult<()> {
        self.finished = true;
        if self.child.try_wait()?.is_none() {
            let _ = self.child.kill().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }
}

struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
    format: FrameFormat,
    path: PathBuf,
}

#[async_trait]
impl FrameSink for FfmpegFrameSink {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        if frame.width() != self.format.width || frame.height() != self.format.height {
            return Err(MediaError::frame_write(format!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.format.width,
                self.format.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::frame_write("writer already finished"))?;

        stdin
            .write_all(frame.as_raw())
            .await
            .map_err(|e| MediaError::frame_write(format!("{}: {}", self.path.display(), e)))
    }

    async fn finish(&mut self) -> MediaResult<()> {
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };
        stdin.flush().await?;
        drop(stdin);

        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::frame_write(format!(
                "encoder exited with status {}: {}",
                status.code().unwrap_or(-1),
                stderr.trim()
            )))
        }
    }
}
