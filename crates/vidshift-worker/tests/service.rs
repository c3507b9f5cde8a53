//! Service tests driving the full pipeline with fake media collaborators.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{broadcast, Notify};
use vidshift_media::{
    FfmpegCommand, Frame, FrameFormat, FrameProcessor, FrameSink, FrameSource, MediaError, MediaResult,
    TranscodeEngine,
};
use vidshift_models::{FrameFilter, JobEvent, JobId, JobOutcome, JobPatch, JobStatus, TransformOptions, Transformation};
use vidshift_store::{InMemoryJobStore, JobStore};
use vidshift_worker::{CancelOutcome, JobError, JobService, ServiceConfig};

/// Engine that records commands and writes a small output file.
#[derive(Default)]
struct RecordingEngine {
    commands: Mutex<Vec<FfmpegCommand>>,
    fail_output_containing: Option<&'static str>,
    no_audio: bool,
    require_inputs: bool,
}

impl RecordingEngine {
    fn commands(&self) -> Vec<FfmpegCommand> {
        self.commands.lock().unwrap().clone()
    }
}

fn is_audio_mux(cmd: &FfmpegCommand) -> bool {
    cmd.input_paths().len() == 2 && cmd.output_arguments().iter().any(|a| a == "1:a")
}

#[async_trait]
impl TranscodeEngine for RecordingEngine {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.commands.lock().unwrap().push(cmd.clone());

        if self.require_inputs {
            if let Some(missing) = cmd.input_paths().into_iter().find(|p| !p.exists()) {
                return Err(MediaError::FileNotFound(missing.to_path_buf()));
            }
        }
        let output = cmd.output_path().to_string_lossy().to_string();
        if let Some(marker) = self.fail_output_containing {
            if output.contains(marker) {
                return Err(MediaError::ffmpeg_failed("exit 1", Some("boom".into()), Some(1)));
            }
        }
        if self.no_audio && is_audio_mux(cmd) {
            return Err(MediaError::ffmpeg_failed(
                "exit 1",
                Some("Stream map '1:a' matches no streams.".into()),
                Some(1),
            ));
        }

        tokio::fs::write(cmd.output_path(), b"encoded").await?;
        Ok(())
    }
}

/// Engine that blocks until released.
#[derive(Default)]
struct GatedEngine {
    entered: Notify,
    gate: Notify,
    finished: Notify,
}

#[async_trait]
impl TranscodeEngine for GatedEngine {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.entered.notify_one();
        self.gate.notified().await;
        tokio::fs::write(cmd.output_path(), b"encoded").await?;
        self.finished.notify_one();
        Ok(())
    }
}

/// Engine that panics mid-run after writing its output.
struct PanicEngine;

#[async_trait]
impl TranscodeEngine for PanicEngine {
    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        tokio::fs::write(cmd.output_path(), b"partial").await?;
        panic!("engine exploded");
    }
}

/// Frame processor producing solid frames and a byte-per-frame output file.
struct FakeFrames {
    frames: u64,
    fail_open: bool,
    fail_sink: bool,
    opened: Mutex<Vec<PathBuf>>,
}

impl FakeFrames {
    fn new(frames: u64) -> Self {
        Self {
            frames,
            fail_open: false,
            fail_sink: false,
            opened: Mutex::new(Vec::new()),
        }
    }
}

struct FakeSource {
    remaining: u64,
    format: FrameFormat,
}

#[async_trait]
impl FrameSource for FakeSource {
    fn format(&self) -> FrameFormat {
        self.format
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(Frame::from_pixel(4, 4, image::Rgb([10, 20, 30]))))
    }

    async fn close(&mut self) -> MediaResult<()> {
        Ok(())
    }
}

struct FakeSink {
    path: PathBuf,
    written: usize,
    finished: Option<Arc<Notify>>,
}

impl FakeSink {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            written: 0,
            finished: None,
        }
    }
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        assert_eq!(frame.dimensions(), (4, 4));
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        if self.written > 0 {
            tokio::fs::write(&self.path, vec![1u8; self.written]).await?;
        }
        if let Some(finished) = &self.finished {
            finished.notify_one();
        }
        Ok(())
    }
}

#[async_trait]
impl FrameProcessor for FakeFrames {
    async fn open(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        if self.fail_open {
            return Err(MediaError::source_open(path.display().to_string()));
        }
        self.opened.lock().unwrap().push(path.to_path_buf());
        Ok(Box::new(FakeSource {
            remaining: self.frames,
            format: FrameFormat::new(4, 4, 0.0, self.frames),
        }))
    }

    async fn create_sink(&self, path: &Path, _format: &FrameFormat) -> MediaResult<Box<dyn FrameSink>> {
        if self.fail_sink {
            return Err(MediaError::sink_open(format!("{}: encoder unavailable", path.display())));
        }
        Ok(Box::new(FakeSink::new(path)))
    }
}

/// Frame processor whose source stalls after the first frame until released.
#[derive(Default)]
struct GatedFrames {
    entered: Arc<Notify>,
    gate: Arc<Notify>,
    sink_finished: Arc<Notify>,
}

struct GatedSource {
    served: u64,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

#[async_trait]
impl FrameSource for GatedSource {
    fn format(&self) -> FrameFormat {
        FrameFormat::new(4, 4, 25.0, 100)
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.served == 1 {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        if self.served == 100 {
            return Ok(None);
        }
        self.served += 1;
        Ok(Some(Frame::from_pixel(4, 4, image::Rgb([1, 2, 3]))))
    }

    async fn close(&mut self) -> MediaResult<()> {
        Ok(())
    }
}

#[async_trait]
impl FrameProcessor for GatedFrames {
    async fn open(&self, _path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(GatedSource {
            served: 0,
            entered: Arc::clone(&self.entered),
            gate: Arc::clone(&self.gate),
        }))
    }

    async fn create_sink(&self, path: &Path, _format: &FrameFormat) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(FakeSink {
            finished: Some(Arc::clone(&self.sink_finished)),
            ..FakeSink::new(path)
        }))
    }
}

struct Harness {
    _dir: TempDir,
    service: JobService,
    config: ServiceConfig,
}

fn harness(engine: Arc<dyn TranscodeEngine>, frames: Arc<dyn FrameProcessor>) -> Harness {
    harness_keeping(engine, frames, 10)
}

fn harness_keeping(engine: Arc<dyn TranscodeEngine>, frames: Arc<dyn FrameProcessor>, max_stored: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = ServiceConfig::default().with_dirs(dir.path().join("uploads"), dir.path().join("processed"));
    config.max_stored_videos = max_stored;

    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let service = JobService::new(config.clone(), store, engine, frames);
    Harness {
        _dir: dir,
        service,
        config,
    }
}

async fn wait_for_completion(rx: &mut broadcast::Receiver<JobEvent>, id: &JobId) -> (JobEvent, Vec<JobEvent>) {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if event.job_id() != id {
                continue;
            }
            if let JobEvent::JobCompleted { .. } = event {
                return (event, seen);
            }
            seen.push(event);
        }
    })
    .await
    .expect("job did not finish")
}

async fn wait_until_empty(dir: &Path) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !files_in(dir).is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("temporary files not removed");
}

fn write_aged(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, b"video").unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
    path
}

fn options(transformation: Transformation, filter: FrameFilter, speed: f64) -> TransformOptions {
    TransformOptions {
        transformation,
        filter,
        speed,
        ..Default::default()
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_direct_copy_completes() {
    let engine = Arc::new(RecordingEngine::default());
    let h = harness(engine.clone(), Arc::new(FakeFrames::new(0)));
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", TransformOptions::default(), b"raw video")
        .await
        .unwrap();
    let (event, progress) = wait_for_completion(&mut rx, &id).await;

    let expected = format!("processed_{}_clip.mp4", id);
    assert_eq!(
        event,
        JobEvent::JobCompleted {
            job_id: id.clone(),
            status: JobStatus::Completed,
            output_filename: Some(expected.clone()),
            error: None,
        }
    );

    let values: Vec<u8> = progress
        .iter()
        .filter_map(|e| match e {
            JobEvent::ProgressUpdate { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![5, 10, 20, 30, 80, 95]);

    let record = h.service.get_status(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.output_filename.as_deref(), Some(expected.as_str()));
    assert!(record.completed_at.is_some());

    let commands = engine.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].build_args().windows(2).any(|w| w == ["-c", "copy"]));
    assert!(h.config.processed_dir.join(&expected).exists());
    assert!(!h.service.registry().is_registered(&id).await);
}

#[tokio::test]
async fn test_filter_path_with_transform_and_speed() {
    let engine = Arc::new(RecordingEngine::default());
    let frames = Arc::new(FakeFrames::new(65));
    let h = harness(engine.clone(), frames.clone());
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", options(Transformation::Hflip, FrameFilter::Sharpen, 2.0), b"raw")
        .await
        .unwrap();
    let (event, progress) = wait_for_completion(&mut rx, &id).await;

    let expected = format!("speed_adj_processed_{}_clip.mp4", id);
    match event {
        JobEvent::JobCompleted {
            status, output_filename, ..
        } => {
            assert_eq!(status, JobStatus::Completed);
            assert_eq!(output_filename.as_deref(), Some(expected.as_str()));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // transform, mux, final encode, speed
    let commands = engine.commands();
    assert_eq!(commands.len(), 4);
    assert!(commands[0].build_args().contains(&"hflip".to_string()));
    assert!(is_audio_mux(&commands[1]));
    assert!(commands[2].output_arguments().iter().any(|a| a == "1:a?"));
    assert!(commands[3].output_arguments().iter().any(|a| a == "setpts=0.5*PTS"));
    assert!(commands[3].output_arguments().iter().any(|a| a == "atempo=2"));

    // frames were read from the muxed intermediate
    let opened = frames.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert!(opened[0].to_string_lossy().contains("temp_ffmpeg_clip.mp4_"));

    let messages: Vec<String> = progress
        .iter()
        .filter_map(|e| match e {
            JobEvent::ProgressUpdate { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert!(messages.contains(&"Processing frame 30/65".to_string()));
    assert!(messages.contains(&"Processing frame 60/65".to_string()));
    assert!(messages.contains(&"Applying speed adjustment (2x)...".to_string()));

    let mut last = 0;
    for event in &progress {
        if let JobEvent::ProgressUpdate { progress, .. } = event {
            assert!(*progress >= last);
            last = *progress;
        }
    }

    // only the final output remains
    assert_eq!(files_in(&h.config.processed_dir), vec![expected]);
}

#[tokio::test]
async fn test_source_without_audio_is_remuxed_video_only() {
    let engine = Arc::new(RecordingEngine {
        no_audio: true,
        ..Default::default()
    });
    let h = harness(engine.clone(), Arc::new(FakeFrames::new(3)));
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("silent.mov", options(Transformation::Grayscale, FrameFilter::Blur, 1.0), b"raw")
        .await
        .unwrap();
    let (event, _) = wait_for_completion(&mut rx, &id).await;
    assert!(matches!(event, JobEvent::JobCompleted { status: JobStatus::Completed, .. }));

    let commands = engine.commands();
    assert_eq!(commands.len(), 4);
    assert!(commands[2].output_arguments().iter().any(|a| a == "-an"));
    // final encode has no audio input
    assert_eq!(commands[3].input_paths().len(), 1);
}

#[tokio::test]
async fn test_engine_failure_records_diagnostics() {
    let engine = Arc::new(RecordingEngine {
        fail_output_containing: Some("processed_"),
        ..Default::default()
    });
    let h = harness(engine, Arc::new(FakeFrames::new(0)));
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", options(Transformation::Invert, FrameFilter::None, 1.0), b"raw")
        .await
        .unwrap();
    let (event, _) = wait_for_completion(&mut rx, &id).await;

    assert_eq!(
        event,
        JobEvent::JobCompleted {
            job_id: id.clone(),
            status: JobStatus::Failed,
            output_filename: None,
            error: Some("FFmpeg processing error: boom".into()),
        }
    );

    let record = h.service.get_status(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 0);
    assert_eq!(record.message, "Processing failed");
    assert!(files_in(&h.config.processed_dir).is_empty());
}

#[tokio::test]
async fn test_frame_source_failure() {
    let frames = Arc::new(FakeFrames {
        fail_open: true,
        ..FakeFrames::new(0)
    });
    let h = harness(Arc::new(RecordingEngine::default()), frames);
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", options(Transformation::None, FrameFilter::EdgeDetect, 1.0), b"raw")
        .await
        .unwrap();
    let (event, _) = wait_for_completion(&mut rx, &id).await;

    match event {
        JobEvent::JobCompleted { status, error, .. } => {
            assert_eq!(status, JobStatus::Failed);
            assert!(error.unwrap().starts_with("Could not open video file: "));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_frame_output_fails() {
    let h = harness(Arc::new(RecordingEngine::default()), Arc::new(FakeFrames::new(0)));
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", options(Transformation::None, FrameFilter::Blur, 1.0), b"raw")
        .await
        .unwrap();
    let (event, _) = wait_for_completion(&mut rx, &id).await;

    match event {
        JobEvent::JobCompleted { status, error, .. } => {
            assert_eq!(status, JobStatus::Failed);
            assert_eq!(
                error.as_deref(),
                Some("Frame processing failed: frame processing produced no output")
            );
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_running_job() {
    let engine = Arc::new(GatedEngine::default());
    let h = harness(engine.clone(), Arc::new(FakeFrames::new(0)));
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", TransformOptions::default(), b"raw")
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), engine.entered.notified())
        .await
        .unwrap();
    assert_eq!(h.service.request_cancel(&id).await, CancelOutcome::Accepted);

    let (event, _) = wait_for_completion(&mut rx, &id).await;
    assert_eq!(
        event,
        JobEvent::JobCompleted {
            job_id: id.clone(),
            status: JobStatus::Cancelled,
            output_filename: None,
            error: Some("Processing cancelled by user".into()),
        }
    );

    // let the engine call finish; the pipeline then removes its output
    engine.gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), engine.finished.notified())
        .await
        .unwrap();

    let output = h.config.output_path_for(&id, "clip.mp4");
    tokio::time::timeout(Duration::from_secs(5), async {
        while output.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("partial output not removed");

    let record = h.service.get_status(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
    assert_eq!(record.message, "Job cancelled by user");

    // second request finds nothing live
    assert_eq!(h.service.request_cancel(&id).await, CancelOutcome::NotFound);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_cancel_unknown_job() {
    let h = harness(Arc::new(RecordingEngine::default()), Arc::new(FakeFrames::new(0)));
    assert_eq!(h.service.request_cancel(&JobId::new()).await, CancelOutcome::NotFound);
}

#[tokio::test]
async fn test_rejected_uploads_create_no_record() {
    let h = harness(Arc::new(RecordingEngine::default()), Arc::new(FakeFrames::new(0)));

    let err = h
        .service
        .accept_upload("notes.txt", TransformOptions::default(), b"raw")
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::UploadRejected(_)));

    let err = h
        .service
        .accept_upload("", TransformOptions::default(), b"raw")
        .await
        .unwrap_err();
    assert!(err.is_rejection());

    let mut small = h.config.clone();
    small.max_upload_bytes = 2;
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let service = JobService::new(
        small,
        store,
        Arc::new(RecordingEngine::default()),
        Arc::new(FakeFrames::new(0)),
    );
    let err = service
        .accept_upload("clip.mp4", TransformOptions::default(), b"too big")
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::UploadRejected(_)));

    assert!(files_in(&h.config.upload_dir).is_empty());
    assert!(h.service.registry().is_empty().await);
}

#[tokio::test]
async fn test_unknown_job_status() {
    let h = harness(Arc::new(RecordingEngine::default()), Arc::new(FakeFrames::new(0)));
    let err = h.service.get_status(&JobId::new()).await.unwrap_err();
    assert!(matches!(err, JobError::NotFound(_)));
}

#[tokio::test]
async fn test_retention_keeps_source_of_live_job() {
    let engine = Arc::new(RecordingEngine {
        require_inputs: true,
        ..Default::default()
    });
    let h = harness_keeping(engine.clone(), Arc::new(FakeFrames::new(0)), 1);
    let mut rx = h.service.subscribe();

    let source = write_aged(&h.config.upload_dir, "clip.mp4", 3600);
    write_aged(&h.config.upload_dir, "newer.mp4", 0);

    let id = h
        .service
        .submit("clip.mp4", TransformOptions::default(), source.clone())
        .await
        .unwrap();
    let (event, _) = wait_for_completion(&mut rx, &id).await;

    match event {
        JobEvent::JobCompleted { status, error, .. } => {
            assert_eq!(status, JobStatus::Completed, "job failed: {:?}", error);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(engine.commands()[0].input_paths(), vec![source.as_path()]);
}

#[tokio::test]
async fn test_concurrent_jobs_stay_isolated() {
    let engine = Arc::new(RecordingEngine {
        require_inputs: true,
        ..Default::default()
    });
    let frames = Arc::new(FakeFrames::new(40));
    let h = harness(engine.clone(), frames.clone());
    let mut rx = h.service.subscribe();

    let opts = || options(Transformation::Hflip, FrameFilter::Sharpen, 1.5);
    let (a, b, c, d) = tokio::join!(
        h.service.accept_upload("clip.mp4", opts(), b"one"),
        h.service.accept_upload("clip.mp4", opts(), b"two"),
        h.service.accept_upload("clip.mp4", opts(), b"three"),
        h.service.accept_upload("clip.mp4", opts(), b"four"),
    );
    let ids = vec![a.unwrap(), b.unwrap(), c.unwrap(), d.unwrap()];
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 4);

    let mut pending: HashSet<JobId> = ids.iter().cloned().collect();
    tokio::time::timeout(Duration::from_secs(10), async {
        while !pending.is_empty() {
            if let JobEvent::JobCompleted {
                job_id, status, error, ..
            } = rx.recv().await.unwrap()
            {
                assert_eq!(status, JobStatus::Completed, "job failed: {:?}", error);
                pending.remove(&job_id);
            }
        }
    })
    .await
    .expect("jobs did not finish");

    let mut expected: Vec<String> = ids
        .iter()
        .map(|id| format!("speed_adj_processed_{}_clip.mp4", id))
        .collect();
    expected.sort();
    assert_eq!(files_in(&h.config.processed_dir), expected);

    for id in &ids {
        let record = h.service.get_status(id).await.unwrap();
        assert_eq!(
            record.output_filename,
            Some(format!("speed_adj_processed_{}_clip.mp4", id))
        );
    }

    // every command touches the files of exactly one job
    let commands = engine.commands();
    assert_eq!(commands.len(), 16);
    for cmd in &commands {
        let mut paths: Vec<String> = cmd
            .input_paths()
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        paths.push(cmd.output_path().to_string_lossy().to_string());

        let owners: HashSet<&JobId> = ids
            .iter()
            .filter(|id| paths.iter().any(|p| p.contains(id.as_str())))
            .collect();
        assert_eq!(owners.len(), 1, "command mixes jobs: {:?}", paths);
        let owner = owners.into_iter().next().unwrap();
        assert!(paths.iter().all(|p| p.contains(owner.as_str())), "{:?}", paths);
    }

    let opened = frames.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 4);
    for id in &ids {
        assert_eq!(
            opened
                .iter()
                .filter(|p| p.to_string_lossy().contains(id.as_str()))
                .count(),
            1
        );
    }
    assert!(h.service.registry().is_empty().await);
}

#[tokio::test]
async fn test_frame_filter_with_speed_skips_transform_stage() {
    let engine = Arc::new(RecordingEngine {
        require_inputs: true,
        ..Default::default()
    });
    let frames = Arc::new(FakeFrames::new(10));
    let h = harness(engine.clone(), frames.clone());
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", options(Transformation::None, FrameFilter::Blur, 2.0), b"raw")
        .await
        .unwrap();
    let (event, progress) = wait_for_completion(&mut rx, &id).await;

    let expected = format!("speed_adj_processed_{}_clip.mp4", id);
    match event {
        JobEvent::JobCompleted {
            status, output_filename, ..
        } => {
            assert_eq!(status, JobStatus::Completed);
            assert_eq!(output_filename.as_deref(), Some(expected.as_str()));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // final encode then speed, nothing before the frame loop
    let commands = engine.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[0].output_arguments().iter().any(|a| a == "1:a?"));
    assert_eq!(commands[0].input_paths()[1], h.config.upload_path_for(&id, "clip.mp4"));
    assert!(commands[1].output_arguments().iter().any(|a| a == "setpts=0.5*PTS"));

    let opened = frames.opened.lock().unwrap().clone();
    assert_eq!(opened, vec![h.config.upload_path_for(&id, "clip.mp4")]);

    let messages: Vec<String> = progress
        .iter()
        .filter_map(|e| match e {
            JobEvent::ProgressUpdate { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert!(!messages.contains(&"Applying FFmpeg transformations...".to_string()));
    assert!(messages.contains(&"Applying speed adjustment (2x)...".to_string()));
    assert_eq!(files_in(&h.config.processed_dir), vec![expected]);
}

#[tokio::test]
async fn test_cancel_during_frame_loop() {
    let engine = Arc::new(RecordingEngine::default());
    let frames = Arc::new(GatedFrames::default());
    let h = harness(engine.clone(), frames.clone());
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", options(Transformation::None, FrameFilter::Blur, 1.0), b"raw")
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), frames.entered.notified())
        .await
        .unwrap();
    assert_eq!(h.service.request_cancel(&id).await, CancelOutcome::Accepted);
    frames.gate.notify_one();

    let (event, _) = wait_for_completion(&mut rx, &id).await;
    assert!(matches!(
        event,
        JobEvent::JobCompleted {
            status: JobStatus::Cancelled,
            ..
        }
    ));

    // the partial frame file is written, then removed with the job's other files
    tokio::time::timeout(Duration::from_secs(5), frames.sink_finished.notified())
        .await
        .unwrap();
    wait_until_empty(&h.config.processed_dir).await;

    assert!(engine.commands().is_empty());
    let record = h.service.get_status(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_panicking_job_is_recorded_as_failed() {
    let h = harness(Arc::new(PanicEngine), Arc::new(FakeFrames::new(0)));
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", TransformOptions::default(), b"raw")
        .await
        .unwrap();
    let (event, _) = wait_for_completion(&mut rx, &id).await;

    assert_eq!(
        event,
        JobEvent::JobCompleted {
            job_id: id.clone(),
            status: JobStatus::Failed,
            output_filename: None,
            error: Some("Unexpected error: engine exploded".into()),
        }
    );

    let record = h.service.get_status(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(!h.service.registry().is_registered(&id).await);
    // dropped with the task
    assert!(files_in(&h.config.processed_dir).is_empty());
}

#[tokio::test]
async fn test_frame_writer_failure_keeps_detail() {
    let frames = Arc::new(FakeFrames {
        fail_sink: true,
        ..FakeFrames::new(5)
    });
    let h = harness(Arc::new(RecordingEngine::default()), frames);
    let mut rx = h.service.subscribe();

    let id = h
        .service
        .accept_upload("clip.mp4", options(Transformation::None, FrameFilter::Sharpen, 1.0), b"raw")
        .await
        .unwrap();
    let (event, _) = wait_for_completion(&mut rx, &id).await;

    match event {
        JobEvent::JobCompleted { status, error, .. } => {
            assert_eq!(status, JobStatus::Failed);
            let error = error.unwrap();
            assert!(error.starts_with("Frame processing failed: Frame writer failed to open: "));
            assert!(error.ends_with("encoder unavailable"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_after_terminal_write_reports_not_found() {
    let engine = Arc::new(GatedEngine::default());
    let h = harness(engine.clone(), Arc::new(FakeFrames::new(0)));

    let id = h
        .service
        .accept_upload("clip.mp4", TransformOptions::default(), b"raw")
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), engine.entered.notified())
        .await
        .unwrap();

    // the job reached its terminal state but has not left the registry yet
    let done = JobOutcome::Completed {
        output_filename: format!("processed_{}_clip.mp4", id),
    };
    h.service
        .store()
        .update(&id, &JobPatch::terminal(&done))
        .await
        .unwrap();

    assert_eq!(h.service.request_cancel(&id).await, CancelOutcome::NotFound);

    let record = h.service.get_status(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);

    engine.gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), engine.finished.notified())
        .await
        .unwrap();
}
