//! Progress reporting to the job store and realtime observers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use vidshift_models::{JobEvent, JobId, JobOutcome, JobPatch, JobStatus};
use vidshift_store::JobStore;

use crate::metrics;
use crate::registry::JobRegistry;

/// Progress checkpoints of the pipeline.
pub mod progress {
    pub const ACCEPTED: u8 = 5;
    pub const ENGINE_INIT: u8 = 10;
    pub const COLOR_GRAPH: u8 = 20;
    pub const FILTERS: u8 = 30;
    pub const STAGE_A: u8 = 35;
    pub const AUDIO_MUX: u8 = 40;
    pub const FRAMES_START: u8 = 45;
    pub const FRAMES_SPAN: u8 = 30;
    pub const DIRECT_ENCODE: u8 = 50;
    pub const STAGE_C: u8 = 75;
    pub const DIRECT_COPY: u8 = 80;
    pub const STAGE_D: u8 = 85;
    pub const FINALIZE: u8 = 95;

    /// Frames between two frame-loop reports.
    pub const FRAME_REPORT_INTERVAL: u64 = 30;

    /// Progress inside the frame loop: 45 + floor(done / total * 30), at most 75.
    pub fn frame_progress(done: u64, total: u64) -> u8 {
        if total == 0 {
            return FRAMES_START;
        }
        let span = (done.min(total) as f64 / total as f64 * FRAMES_SPAN as f64).floor() as u8;
        (FRAMES_START + span).min(FRAMES_START + FRAMES_SPAN)
    }
}

/// Fan-out of job events to realtime observers.
///
/// Delivery is best effort: lagging receivers lose the oldest events.
#[derive(Debug, Clone)]
pub struct ProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Send an event. Having no observers is not an error.
    pub fn send(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Writes job progress and terminal states, then notifies observers.
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    registry: Arc<JobRegistry>,
    broadcaster: ProgressBroadcaster,
    last_progress: Mutex<HashMap<JobId, u8>>,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn JobStore>, registry: Arc<JobRegistry>, broadcaster: ProgressBroadcaster) -> Self {
        Self {
            store,
            registry,
            broadcaster,
            last_progress: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    /// Record a progress checkpoint.
    ///
    /// Returns `true` when the store accepted it and observers were notified.
    /// Store failures are logged and swallowed.
    pub async fn report(&self, id: &JobId, progress: u8, message: &str, status: Option<JobStatus>) -> bool {
        let progress = {
            let mut last = self.last_progress.lock().await;
            let value = last.get(id).copied().unwrap_or(0).max(progress.min(100));
            last.insert(id.clone(), value);
            value
        };

        let patch = match status {
            Some(status) => JobPatch::progress_with_status(progress, message, status),
            None => JobPatch::progress(progress, message),
        };

        match self.store.update(id, &patch).await {
            Ok(outcome) if outcome.is_applied() => {
                debug!(job_id = %id, progress, message, "Progress update");
                self.broadcaster.send(JobEvent::progress(
                    id,
                    progress,
                    message,
                    status.unwrap_or(JobStatus::Processing),
                ));
                true
            }
            Ok(_) => {
                debug!(job_id = %id, progress, "Progress ignored, job already terminal");
                self.last_progress.lock().await.remove(id);
                false
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "Failed to record progress");
                self.last_progress.lock().await.remove(id);
                false
            }
        }
    }

    /// Jobs with a remembered progress value.
    pub async fn tracked_jobs(&self) -> usize {
        self.last_progress.lock().await.len()
    }

    /// Write the terminal state. Only the first terminal write takes effect.
    ///
    /// The job leaves the registry either way.
    pub async fn finalize(&self, id: &JobId, outcome: JobOutcome) -> bool {
        let patch = JobPatch::terminal(&outcome);
        let applied = match self.store.update(id, &patch).await {
            Ok(result) => result.is_applied(),
            Err(e) => {
                warn!(job_id = %id, error = %e, "Failed to record terminal state");
                false
            }
        };

        self.registry.deregister(id).await;
        self.last_progress.lock().await.remove(id);

        if applied {
            metrics::record_job_finished(outcome.status());
            self.broadcaster.send(JobEvent::completed(id, &outcome));
        } else {
            debug!(job_id = %id, status = %outcome.status(), "Terminal state already recorded");
        }
        applied
    }
}
