//! Staged transformation pipeline.
//!
//! A job runs as one background task through up to four stages:
//!
//! 1. engine transcode applying the filter graph (transform, color, speed)
//! 2. per-frame pixel filtering through the frame processor
//! 3. final re-encode of the frame output with the original audio
//! 4. speed adjustment when a frame filter deferred it
//!
//! or, when nothing needs changing, a plain stream copy. Progress is reported
//! at fixed checkpoints. Cancellation is observed between stages and between
//! frames; a cancelled job removes its files and leaves the terminal write to
//! the cancel request.

mod artifacts;
mod plan;

pub use artifacts::TempArtifacts;
pub use plan::{Stage, StagePlan};

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{warn, Instrument};
use vidshift_media::{
    apply_frame_filter, atempo_chain, build_filter_graph, setpts_filter, FfmpegCommand, FrameProcessor,
    TranscodeEngine,
};
use vidshift_models::{JobId, JobOutcome, JobStatus, TransformOptions};

use crate::error::{context, JobError, JobResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::registry::CancellationToken;
use crate::reporter::progress::{self, frame_progress};
use crate::reporter::ProgressReporter;
use crate::retention::RetentionManager;

/// Everything a pipeline run needs to know about its job.
#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub job_id: JobId,
    /// Name the client uploaded the file under
    pub original_filename: String,
    /// Saved upload
    pub source: PathBuf,
    /// Output location in the processed folder
    pub destination: PathBuf,
    pub options: TransformOptions,
}

impl PipelineJob {
    fn work_dir(&self) -> PathBuf {
        self.destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    fn temp_path(&self, name: String) -> PathBuf {
        self.work_dir().join(name)
    }
}

/// Runs transformation jobs.
pub struct Pipeline {
    engine: Arc<dyn TranscodeEngine>,
    frames: Arc<dyn FrameProcessor>,
    reporter: Arc<ProgressReporter>,
    retention: Arc<RetentionManager>,
    max_stored_videos: usize,
}

impl Pipeline {
    pub fn new(
        engine: Arc<dyn TranscodeEngine>,
        frames: Arc<dyn FrameProcessor>,
        reporter: Arc<ProgressReporter>,
        retention: Arc<RetentionManager>,
        max_stored_videos: usize,
    ) -> Self {
        Self {
            engine,
            frames,
            reporter,
            retention,
            max_stored_videos,
        }
    }

    /// Run a job on a background task.
    ///
    /// The returned handle belongs to a supervising task that records a
    /// failure if the pipeline task panics.
    pub fn spawn(self: &Arc<Self>, job: PipelineJob, cancel: CancellationToken) -> JoinHandle<()> {
        let job_id = job.job_id.clone();
        let span = JobLogger::new(&job_id, "transform").create_span();
        let pipeline = Arc::clone(self);
        let reporter = Arc::clone(&self.reporter);

        let task = tokio::spawn(async move { pipeline.run(job, cancel).await }.instrument(span));

        tokio::spawn(async move {
            if let Err(e) = task.await {
                if e.is_panic() {
                    let err = JobError::unexpected(panic_message(e.into_panic()));
                    JobLogger::new(&job_id, "transform").log_error(&err.to_string());
                    reporter
                        .finalize(&job_id, JobOutcome::Failed { error: err.to_string() })
                        .await;
                }
            }
        })
    }

    /// Run a job to its end on the current task.
    pub async fn run(&self, job: PipelineJob, cancel: CancellationToken) {
        let logger = JobLogger::new(&job.job_id, "transform");
        logger.log_start(&job.original_filename);

        let mut artifacts = TempArtifacts::new();
        let result = self.execute(&job, &cancel, &mut artifacts, &logger).await;
        artifacts.cleanup().await;

        match result {
            Ok(output) => {
                let output_filename = file_name(&output);
                let applied = self
                    .reporter
                    .finalize(
                        &job.job_id,
                        JobOutcome::Completed {
                            output_filename: output_filename.clone(),
                        },
                    )
                    .await;

                if applied {
                    logger.log_completion(&output_filename);
                } else if cancel.is_cancelled() {
                    // Cancel request won the terminal write
                    let _ = tokio::fs::remove_file(&output).await;
                    logger.log_cancelled();
                }

                self.retention.enforce(self.max_stored_videos).await;
            }
            Err(JobError::CancellationRequested) => logger.log_cancelled(),
            Err(e) => {
                logger.log_error(&e.to_string());
                self.reporter
                    .finalize(&job.job_id, JobOutcome::Failed { error: e.to_string() })
                    .await;
            }
        }
    }

    /// Run every stage. Returns the final output path.
    async fn execute(
        &self,
        job: &PipelineJob,
        cancel: &CancellationToken,
        artifacts: &mut TempArtifacts,
        logger: &JobLogger,
    ) -> JobResult<PathBuf> {
        let plan = StagePlan::from_options(&job.options);
        artifacts.track(&job.destination);

        check_cancel(cancel)?;
        self.report(job, progress::ACCEPTED, "Starting video processing...", Some(JobStatus::Processing))
            .await;

        check_cancel(cancel)?;
        self.report(job, progress::ENGINE_INIT, "Initializing FFmpeg stream...", None)
            .await;
        let graph = build_filter_graph(&job.options);

        self.report(job, progress::COLOR_GRAPH, "Applying color adjustments...", None)
            .await;
        self.report(job, progress::FILTERS, "Processing video filters...", None)
            .await;

        let output = if plan.frame_filter {
            self.run_filter_path(job, &plan, graph, cancel, artifacts, logger)
                .await?
        } else if plan.transform {
            self.report(job, progress::DIRECT_ENCODE, "Processing with FFmpeg...", None)
                .await;
            logger.log_stage(Stage::Transform.as_str());

            let mut cmd = FfmpegCommand::new(&job.source, &job.destination)
                .map("0:v")
                .map("0:a?");
            if let Some(graph) = graph {
                cmd = cmd.video_filter(graph);
            }
            if job.options.speed_changed() {
                cmd = cmd.audio_filter(atempo_chain(job.options.speed));
            }
            let cmd = cmd
                .video_codec("libx264")
                .audio_codec("aac")
                .strict_experimental();

            self.run_engine(Stage::Transform, context::TRANSFORM, &cmd)
                .await?;
            job.destination.clone()
        } else {
            self.report(job, progress::DIRECT_COPY, "Copying video file...", None)
                .await;
            logger.log_stage(Stage::DirectCopy.as_str());

            let cmd = FfmpegCommand::new(&job.source, &job.destination).stream_copy();
            self.run_engine(Stage::DirectCopy, context::COPY, &cmd)
                .await?;
            job.destination.clone()
        };

        self.report(job, progress::FINALIZE, "Finalizing...", None)
            .await;
        validate_output(&output).await?;
        check_cancel(cancel)?;

        artifacts.release(&output);
        Ok(output)
    }

    async fn run_filter_path(
        &self,
        job: &PipelineJob,
        plan: &StagePlan,
        graph: Option<String>,
        cancel: &CancellationToken,
        artifacts: &mut TempArtifacts,
        logger: &JobLogger,
    ) -> JobResult<PathBuf> {
        let id = &job.job_id;
        let name = &job.original_filename;

        // Stage A: engine pass, then put the source audio back
        let (frame_input, audio_source, intermediate) = match graph.filter(|_| plan.transform) {
            Some(graph) => {
                check_cancel(cancel)?;
                self.report(job, progress::STAGE_A, "Applying FFmpeg transformations...", None)
                    .await;
                logger.log_stage(Stage::Transform.as_str());

                let video_only = artifacts.track(job.temp_path(format!("very_temp_v_{}.mkv", id)));
                let muxed = artifacts.track(job.temp_path(format!("temp_ffmpeg_{}_{}.mp4", name, id)));

                let transform = FfmpegCommand::new(&job.source, &video_only)
                    .video_filter(graph)
                    .video_codec("libx264")
                    .preset("ultrafast")
                    .qp(0)
                    .no_audio();
                self.run_engine(Stage::Transform, context::TRANSFORM, &transform)
                    .await?;

                check_cancel(cancel)?;
                self.report(job, progress::AUDIO_MUX, "Muxing audio and video...", None)
                    .await;

                let mux = FfmpegCommand::new(&video_only, &muxed)
                    .add_input(&job.source)
                    .map("0:v")
                    .map("1:a")
                    .video_codec("copy")
                    .audio_codec("aac")
                    .strict_experimental()
                    .shortest();

                let has_audio = match self.engine.run(&mux).await {
                    Ok(()) => true,
                    Err(e) if e.is_missing_audio() => {
                        logger.log_warning("source has no audio stream, continuing without audio");
                        let remux = FfmpegCommand::new(&video_only, &muxed)
                            .video_codec("copy")
                            .no_audio();
                        self.run_engine(Stage::Transform, context::TRANSFORM, &remux)
                            .await?;
                        false
                    }
                    Err(e) => return Err(JobError::engine(context::TRANSFORM, &e)),
                };
                artifacts.remove(&video_only).await;
                check_cancel(cancel)?;

                let audio_source = has_audio.then(|| muxed.clone());
                (muxed.clone(), audio_source, Some(muxed))
            }
            None => (job.source.clone(), Some(job.source.clone()), None),
        };

        // Stage B: per-frame filter
        self.report(job, progress::FRAMES_START, "Starting frame processing...", None)
            .await;
        logger.log_stage(Stage::FrameFilter.as_str());

        let frames_path = artifacts.track(job.temp_path(format!("temp_frames_{}_{}.avi", name, id)));
        let started = Instant::now();
        let fps = self
            .process_frames(job, &frame_input, &frames_path, cancel)
            .await?;
        metrics::record_stage_duration(Stage::FrameFilter.as_str(), started.elapsed().as_secs_f64());

        // Stage C: re-encode and attach audio
        self.report(job, progress::STAGE_C, "Finalizing video encoding...", None)
            .await;
        logger.log_stage(Stage::FinalEncode.as_str());

        if !is_non_empty(&frames_path).await {
            return Err(JobError::FrameProcessorWriteFailure(
                "frame processing produced no output".to_string(),
            ));
        }

        let mut encode = FfmpegCommand::new(&frames_path, &job.destination).input_frame_rate(fps);
        encode = match audio_source {
            Some(ref audio) => encode
                .add_input(audio)
                .map("0:v")
                .map("1:a?")
                .audio_codec("aac")
                .strict_experimental(),
            None => encode.map("0:v"),
        };
        let encode = encode
            .video_codec("libx264")
            .frame_rate(fps)
            .video_bitrate("1500k");

        self.run_engine(Stage::FinalEncode, context::FINAL_ENCODE, &encode)
            .await?;

        artifacts.remove(&frames_path).await;
        if let Some(ref path) = intermediate {
            artifacts.remove(path).await;
        }

        if !plan.speed_adjust {
            return Ok(job.destination.clone());
        }

        // Stage D: speed change deferred past the frame filter
        check_cancel(cancel)?;
        let speed = job.options.speed;
        self.report(
            job,
            progress::STAGE_D,
            &format!("Applying speed adjustment ({}x)...", speed),
            None,
        )
        .await;
        logger.log_stage(Stage::SpeedAdjust.as_str());

        let speed_path = artifacts.track(job.temp_path(format!("speed_adj_{}", file_name(&job.destination))));
        let adjust = FfmpegCommand::new(&job.destination, &speed_path)
            .map("0:v")
            .map("0:a?")
            .video_filter(setpts_filter(speed))
            .audio_filter(atempo_chain(speed))
            .video_codec("libx264")
            .audio_codec("aac")
            .strict_experimental();

        self.run_engine(Stage::SpeedAdjust, context::SPEED, &adjust)
            .await?;
        artifacts.remove(&job.destination).await;

        Ok(speed_path)
    }

    /// Decode, filter and re-encode every frame. Returns the frame rate used.
    async fn process_frames(
        &self,
        job: &PipelineJob,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> JobResult<f64> {
        let mut source = self.frames.open(input).await.map_err(|e| {
            warn!(job_id = %job.job_id, error = %e, "Frame source failed to open");
            JobError::FrameProcessorOpenFailure(input.display().to_string())
        })?;

        let format = source.format();
        let mut sink = match self.frames.create_sink(output, &format).await {
            Ok(sink) => sink,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Frame writer failed to open");
                let _ = source.close().await;
                return Err(JobError::FrameProcessorWriteFailure(e.to_string()));
            }
        };

        let filter = job.options.filter;
        let total = format.total_frames;
        let mut done: u64 = 0;

        let result: JobResult<()> = async {
            loop {
                check_cancel(cancel)?;

                let Some(frame) = source.next_frame().await? else {
                    break;
                };
                done += 1;

                let filtered = tokio::task::spawn_blocking(move || apply_frame_filter(filter, frame))
                    .await
                    .map_err(|e| JobError::unexpected(format!("frame filter task failed: {}", e)))?;
                sink.write_frame(&filtered).await?;

                if done % progress::FRAME_REPORT_INTERVAL == 0 && total > 0 {
                    self.report(
                        job,
                        frame_progress(done, total),
                        &format!("Processing frame {}/{}", done, total),
                        None,
                    )
                    .await;
                }
            }
            Ok(())
        }
        .await;

        let _ = source.close().await;
        match result {
            Ok(()) => {
                sink.finish().await?;
                Ok(format.fps)
            }
            Err(e) => {
                let _ = sink.finish().await;
                Err(e)
            }
        }
    }

    async fn run_engine(&self, stage: Stage, context: &'static str, cmd: &FfmpegCommand) -> JobResult<()> {
        let started = Instant::now();
        let result = self.engine.run(cmd).await;
        metrics::record_stage_duration(stage.as_str(), started.elapsed().as_secs_f64());
        result.map_err(|e| JobError::engine(context, &e))
    }

    async fn report(&self, job: &PipelineJob, progress: u8, message: &str, status: Option<JobStatus>) {
        self.reporter
            .report(&job.job_id, progress, message, status)
            .await;
    }
}

fn check_cancel(cancel: &CancellationToken) -> JobResult<()> {
    if cancel.is_cancelled() {
        Err(JobError::CancellationRequested)
    } else {
        Ok(())
    }
}

async fn validate_output(path: &Path) -> JobResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(JobError::output_invalid("Processed file is empty")),
        Err(_) => Err(JobError::output_invalid("Processed file not found")),
    }
}

async fn is_non_empty(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "pipeline task panicked".to_string()
    }
}
