use super::encoder::EncoderDriver;
use super::errors::TranscodingError;
use super::queue::{JobMessage, JobQueue, StartRateLimiter};
use crate::events::{EventBus, VideoEvent};
use crate::models::{JobStatus, Resolution, VideoStatus};
use crate::storage::StorageLayout;
use crate::store::{JobUpdate, StateStore, VideoUpdate};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Progress deltas below this are not persisted or emitted.
const PROGRESS_EMIT_STEP: u8 = 5;

/// TranscodingWorker executes one queued job at a time: drives the encoder,
/// persists progress, and writes the terminal job/video state.
///
/// All state writes tolerate a vanished record: deleting a video mid-flight
/// turns the worker's remaining writes into no-ops.
pub struct TranscodingWorker {
    store: Arc<StateStore>,
    layout: StorageLayout,
    bus: Arc<EventBus>,
    encoder: EncoderDriver,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl TranscodingWorker {
    pub fn new(
        store: Arc<StateStore>,
        layout: StorageLayout,
        bus: Arc<EventBus>,
        encoder: EncoderDriver,
        max_attempts: u32,
        initial_backoff: Duration,
    ) -> Self {
        Self {
            store,
            layout,
            bus,
            encoder,
            max_attempts,
            initial_backoff,
        }
    }

    /// Runs one job to a terminal state, retrying transient encoder failures
    /// with exponential backoff.
    pub async fn execute(&self, message: JobMessage) {
        let Some(job) = self.store.get_job(message.job_id) else {
            // Video deleted while the job sat in the queue.
            warn!(job_id = %message.job_id, "Job vanished before start, skipping");
            return;
        };

        info!(
            job_id = %job.id,
            video_id = %job.video_id,
            resolution = %job.resolution,
            "Starting transcoding job"
        );

        self.store.update_job(
            job.id,
            JobUpdate {
                status: Some(JobStatus::Processing),
                started_at: Some(Utc::now()),
                ..Default::default()
            },
        );

        if let Some(video) = self.store.get_video(job.video_id) {
            if video.status != VideoStatus::Transcoding {
                self.store.update_video(
                    job.video_id,
                    VideoUpdate {
                        status: Some(VideoStatus::Transcoding),
                        ..Default::default()
                    },
                );
            }
        }

        self.bus
            .emit(VideoEvent::transcoding_started(job.video_id, job.resolution));
        self.report_progress(job.id, job.video_id, job.resolution, 0);

        let mut attempt = 1;
        loop {
            match self.run_attempt(&message).await {
                Ok(()) => return,
                Err(e) if attempt < self.max_attempts => {
                    let backoff = self.initial_backoff * 2u32.pow(attempt - 1);
                    warn!(
                        job_id = %job.id,
                        attempt = attempt,
                        backoff_seconds = backoff.as_secs(),
                        error = %e,
                        "Transcoding attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        job_id = %job.id,
                        attempts = attempt,
                        error = %e,
                        "Transcoding failed permanently"
                    );
                    self.handle_failure(job.id, job.video_id, job.resolution, &e);
                    return;
                }
            }
        }
    }

    /// One encoder run; success bookkeeping happens here so a retry never
    /// repeats it.
    async fn run_attempt(&self, message: &JobMessage) -> Result<(), TranscodingError> {
        let Some(job) = self.store.get_job(message.job_id) else {
            // Deleted mid-flight; nothing left to do.
            return Ok(());
        };

        let output_dir = self.layout.resolution_dir(job.video_id, job.resolution);
        tokio::fs::create_dir_all(&output_dir).await?;

        // Percent 0 was already reported before the first attempt.
        let mut throttle = ProgressThrottle {
            step: PROGRESS_EMIT_STEP,
            last: Some(0),
        };
        let store = self.store.clone();
        let bus = self.bus.clone();
        let (job_id, video_id, resolution) = (job.id, job.video_id, job.resolution);

        self.encoder
            .run(&job.input_path, &output_dir, job.resolution, |percent| {
                if throttle.should_emit(percent) {
                    store.set_transcoding_progress(video_id, resolution, percent);
                    store.update_job(
                        job_id,
                        JobUpdate {
                            progress: Some(percent),
                            ..Default::default()
                        },
                    );
                    bus.emit(VideoEvent::transcoding_progress(
                        video_id, resolution, percent,
                    ));
                }
            })
            .await?;

        self.handle_success(job_id, video_id, resolution);
        Ok(())
    }

    fn report_progress(&self, job_id: Uuid, video_id: Uuid, resolution: Resolution, percent: u8) {
        self.store
            .set_transcoding_progress(video_id, resolution, percent);
        self.store.update_job(
            job_id,
            JobUpdate {
                progress: Some(percent),
                ..Default::default()
            },
        );
        self.bus
            .emit(VideoEvent::transcoding_progress(video_id, resolution, percent));
    }

    fn handle_success(&self, job_id: Uuid, video_id: Uuid, resolution: Resolution) {
        let playlist_url = format!("/stream/{}/{}/playlist.m3u8", video_id, resolution);

        self.store.update_job(
            job_id,
            JobUpdate {
                status: Some(JobStatus::Completed),
                progress: Some(100),
                output_path: Some(playlist_url.clone()),
                completed_at: Some(Utc::now()),
                ..Default::default()
            },
        );
        self.store
            .complete_resolution(video_id, resolution, playlist_url.clone());

        info!(
            job_id = %job_id,
            video_id = %video_id,
            resolution = %resolution,
            "Transcoding completed"
        );
        self.bus.emit(VideoEvent::transcoding_completed(
            video_id,
            resolution,
            &playlist_url,
        ));
    }

    fn handle_failure(
        &self,
        job_id: Uuid,
        video_id: Uuid,
        resolution: Resolution,
        error: &TranscodingError,
    ) {
        let message = error.to_string();
        self.store.update_job(
            job_id,
            JobUpdate {
                status: Some(JobStatus::Failed),
                error_message: Some(message.clone()),
                completed_at: Some(Utc::now()),
                ..Default::default()
            },
        );
        self.store.fail_resolution(video_id, resolution, message.clone());
        self.bus
            .emit(VideoEvent::transcoding_failed(video_id, resolution, &message));
    }
}

/// Emits on the first value, every advance of at least `step`, and always on
/// 100.
struct ProgressThrottle {
    step: u8,
    last: Option<u8>,
}

impl ProgressThrottle {
    fn new(step: u8) -> Self {
        Self { step, last: None }
    }

    fn should_emit(&mut self, percent: u8) -> bool {
        let emit = match self.last {
            None => true,
            Some(last) => percent == 100 && last != 100 || percent >= last.saturating_add(self.step),
        };
        if emit {
            self.last = Some(percent);
        }
        emit
    }
}

/// Pulls jobs off the queue and runs them on the worker pool: bounded
/// concurrency via semaphore, start rate via the sliding-window limiter.
pub fn start_dispatcher(
    queue: Arc<JobQueue>,
    worker: Arc<TranscodingWorker>,
    max_concurrent: usize,
    limiter: Arc<StartRateLimiter>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        info!(max_concurrent = max_concurrent, "Transcoding dispatcher started");
        loop {
            let message = queue.next().await;
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("worker semaphore closed");
            limiter.acquire().await;

            let worker = worker.clone();
            tokio::spawn(async move {
                worker.execute(message).await;
                drop(permit);
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::models::Resolution;
    use tempfile::TempDir;

    fn worker_setup(binary: &str) -> (TempDir, Arc<StateStore>, Arc<EventBus>, TranscodingWorker) {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf());
        let store = Arc::new(StateStore::new());
        let bus = Arc::new(EventBus::local_only("video-events".to_string()));
        let worker = TranscodingWorker::new(
            store.clone(),
            layout,
            bus.clone(),
            EncoderDriver::with_binary(binary.to_string(), 4),
            3,
            Duration::from_secs(1),
        );
        (dir, store, bus, worker)
    }

    #[test]
    fn test_progress_throttle() {
        let mut throttle = ProgressThrottle::new(5);
        assert!(throttle.should_emit(0));
        assert!(!throttle.should_emit(2));
        assert!(!throttle.should_emit(4));
        assert!(throttle.should_emit(5));
        assert!(!throttle.should_emit(8));
        assert!(throttle.should_emit(12));
        assert!(throttle.should_emit(99));
        assert!(throttle.should_emit(100));
        assert!(!throttle.should_emit(100));
    }

    #[test]
    fn test_progress_throttle_always_passes_terminal() {
        let mut throttle = ProgressThrottle::new(5);
        assert!(throttle.should_emit(97));
        // 100 is only 3 ahead but must still fire
        assert!(throttle.should_emit(100));
    }

    #[tokio::test]
    async fn test_execute_skips_vanished_job() {
        let (_dir, _store, _bus, worker) = worker_setup("ffmpeg");
        // No job in the store: must return without panicking.
        worker
            .execute(JobMessage {
                job_id: Uuid::new_v4(),
                video_id: Uuid::new_v4(),
                resolution: Resolution::Low,
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_failure_marks_job_and_video_failed() {
        let (_dir, store, bus, worker) = worker_setup("no-such-encoder-binary");
        let mut rx = bus.subscribe();

        let video = store.create_video("clip.mp4".into(), 1024, "video/mp4".into());
        store.init_transcoding_progress(video.id);
        let job = store.create_job(video.id, Resolution::Medium, "/tmp/in.mp4".into());

        worker
            .execute(JobMessage {
                job_id: job.id,
                video_id: video.id,
                resolution: Resolution::Medium,
            })
            .await;

        let job = store.get_job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.is_some());
        assert!(job.completed_at.is_some());

        let video = store.get_video(video.id).unwrap();
        assert_eq!(video.status, VideoStatus::Failed);

        // Started, Progress(0), Failed — in that order
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::TranscodingStarted);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::TranscodingProgress);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::TranscodingFailed);
    }

    #[tokio::test]
    async fn test_success_bookkeeping_writes_playlist_url() {
        let (_dir, store, _bus, worker) = worker_setup("ffmpeg");
        let video = store.create_video("clip.mp4".into(), 1024, "video/mp4".into());
        store.init_transcoding_progress(video.id);
        let job = store.create_job(video.id, Resolution::Low, "/tmp/in.mp4".into());

        worker.handle_success(job.id, video.id, Resolution::Low);

        let job = store.get_job(job.id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(
            job.output_path.as_deref(),
            Some(format!("/stream/{}/low/playlist.m3u8", video.id).as_str())
        );

        let video = store.get_video(video.id).unwrap();
        assert_eq!(
            video.hls_urls.get(&Resolution::Low).unwrap(),
            &format!("/stream/{}/low/playlist.m3u8", video.id)
        );
        assert_eq!(video.transcoding_progress[&Resolution::Low], 100);
        // Other resolutions still pending: video not Completed yet
        assert_ne!(video.status, VideoStatus::Completed);
    }
}
