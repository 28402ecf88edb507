//! In-memory state store.
//!
//! Three typed maps (videos, upload sessions, transcoding jobs), each guarded
//! by its own mutex. Every mutation is a named read-modify-write operation;
//! updates are visible to concurrent readers before the call returns. The
//! method surface is kept narrow so a transactional backend can replace this
//! struct without touching callers.
//!
//! Lock order when an operation spans maps: sessions, then videos, then jobs.

use crate::models::{
    JobStatus, Resolution, TranscodingJob, UploadSession, UploadStatus, Video, VideoStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Partial update for a video record; only set fields change.
#[derive(Debug, Default)]
pub struct VideoUpdate {
    pub status: Option<VideoStatus>,
    pub upload_progress: Option<f64>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial update for a transcoding job; only set fields change.
#[derive(Debug, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub output_path: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// StateStore holds all video, session, and job records.
#[derive(Debug, Default)]
pub struct StateStore {
    sessions: Mutex<HashMap<Uuid, UploadSession>>,
    videos: Mutex<HashMap<Uuid, Video>>,
    jobs: Mutex<HashMap<Uuid, TranscodingJob>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- videos ----

    /// Creates a video record in the Uploading state.
    pub fn create_video(&self, filename: String, total_size: u64, mime_type: String) -> Video {
        let video = Video::new(filename, total_size, mime_type);
        self.videos
            .lock()
            .expect("videos lock poisoned")
            .insert(video.id, video.clone());
        debug!(video_id = %video.id, "Created video record");
        video
    }

    pub fn get_video(&self, id: Uuid) -> Option<Video> {
        self.videos
            .lock()
            .expect("videos lock poisoned")
            .get(&id)
            .cloned()
    }

    /// All videos, newest first.
    pub fn list_videos(&self) -> Vec<Video> {
        let mut videos: Vec<Video> = self
            .videos
            .lock()
            .expect("videos lock poisoned")
            .values()
            .cloned()
            .collect();
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        videos
    }

    /// Applies a partial update; returns the updated record, or None if the
    /// video no longer exists (tolerated for late worker writes).
    pub fn update_video(&self, id: Uuid, update: VideoUpdate) -> Option<Video> {
        let mut videos = self.videos.lock().expect("videos lock poisoned");
        let video = videos.get_mut(&id)?;
        if let Some(status) = update.status {
            video.status = status;
        }
        if let Some(progress) = update.upload_progress {
            video.upload_progress = progress;
        }
        if let Some(message) = update.error_message {
            video.error_message = Some(message);
        }
        if let Some(at) = update.completed_at {
            video.completed_at = Some(at);
        }
        Some(video.clone())
    }

    /// Zeroes per-resolution progress for all three resolutions.
    pub fn init_transcoding_progress(&self, id: Uuid) -> Option<Video> {
        let mut videos = self.videos.lock().expect("videos lock poisoned");
        let video = videos.get_mut(&id)?;
        for resolution in Resolution::ALL {
            video.transcoding_progress.insert(resolution, 0);
        }
        Some(video.clone())
    }

    /// Writes one resolution's transcode percent.
    pub fn set_transcoding_progress(
        &self,
        id: Uuid,
        resolution: Resolution,
        progress: u8,
    ) -> Option<Video> {
        let mut videos = self.videos.lock().expect("videos lock poisoned");
        let video = videos.get_mut(&id)?;
        video.transcoding_progress.insert(resolution, progress);
        Some(video.clone())
    }

    /// Records a completed resolution: playlist URL + 100 percent, and flips
    /// the video to Completed in the same critical section iff all three
    /// resolutions are done.
    pub fn complete_resolution(
        &self,
        id: Uuid,
        resolution: Resolution,
        playlist_url: String,
    ) -> Option<Video> {
        let mut videos = self.videos.lock().expect("videos lock poisoned");
        let video = videos.get_mut(&id)?;
        video.hls_urls.insert(resolution, playlist_url);
        video.transcoding_progress.insert(resolution, 100);
        if video.all_resolutions_complete() && video.status != VideoStatus::Failed {
            video.status = VideoStatus::Completed;
            video.completed_at = Some(Utc::now());
        }
        Some(video.clone())
    }

    /// Records a failed resolution: the video is Failed with the message.
    pub fn fail_resolution(
        &self,
        id: Uuid,
        resolution: Resolution,
        message: String,
    ) -> Option<Video> {
        let mut videos = self.videos.lock().expect("videos lock poisoned");
        let video = videos.get_mut(&id)?;
        video.status = VideoStatus::Failed;
        video.error_message = Some(format!("{}: {}", resolution, message));
        Some(video.clone())
    }

    /// Removes the video and all of its jobs. Returns the removed record.
    pub fn delete_video(&self, id: Uuid) -> Option<Video> {
        let removed = self.videos.lock().expect("videos lock poisoned").remove(&id);
        if removed.is_some() {
            self.jobs
                .lock()
                .expect("jobs lock poisoned")
                .retain(|_, job| job.video_id != id);
        }
        removed
    }

    // ---- upload sessions ----

    pub fn create_session(
        &self,
        video_id: Uuid,
        filename: String,
        total_size: u64,
        chunk_size: u64,
    ) -> UploadSession {
        let session = UploadSession::new(video_id, filename, total_size, chunk_size);
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .insert(session.id, session.clone());
        debug!(session_id = %session.id, video_id = %video_id, "Created upload session");
        session
    }

    pub fn get_session(&self, id: Uuid) -> Option<UploadSession> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .get(&id)
            .cloned()
    }

    pub fn list_sessions(&self) -> Vec<UploadSession> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Ids of sessions currently in the Active set.
    pub fn active_session_count(&self) -> usize {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .values()
            .filter(|s| s.status == UploadStatus::Active)
            .count()
    }

    pub fn set_session_status(&self, id: Uuid, status: UploadStatus) -> Option<UploadSession> {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        let session = sessions.get_mut(&id)?;
        session.status = status;
        Some(session.clone())
    }

    pub fn remove_session(&self, id: Uuid) -> Option<UploadSession> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .remove(&id)
    }

    /// Marks one chunk index received. Idempotent: re-marking a known index
    /// changes nothing. Recomputes the owning video's upload percent inside
    /// the same operation. Returns the updated session, or None if the
    /// session is unknown.
    pub fn mark_chunk_received(&self, session_id: Uuid, chunk_index: u32) -> Option<UploadSession> {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        let session = sessions.get_mut(&session_id)?;
        session.received_chunks.insert(chunk_index);
        let snapshot = session.clone();

        let mut videos = self.videos.lock().expect("videos lock poisoned");
        if let Some(video) = videos.get_mut(&snapshot.video_id) {
            video.upload_progress = snapshot.progress_percentage();
        }
        Some(snapshot)
    }

    // ---- transcoding jobs ----

    /// Creates a pending job for one (video, resolution) pair. At most one
    /// job per pair ever exists; a second create returns the existing job.
    pub fn create_job(
        &self,
        video_id: Uuid,
        resolution: Resolution,
        input_path: PathBuf,
    ) -> TranscodingJob {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        if let Some(existing) = jobs
            .values()
            .find(|j| j.video_id == video_id && j.resolution == resolution)
        {
            return existing.clone();
        }
        let job = TranscodingJob::new(video_id, resolution, input_path);
        jobs.insert(job.id, job.clone());
        debug!(job_id = %job.id, video_id = %video_id, resolution = %resolution, "Created transcoding job");
        job
    }

    pub fn get_job(&self, id: Uuid) -> Option<TranscodingJob> {
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .get(&id)
            .cloned()
    }

    pub fn jobs_for_video(&self, video_id: Uuid) -> Vec<TranscodingJob> {
        let mut jobs: Vec<TranscodingJob> = self
            .jobs
            .lock()
            .expect("jobs lock poisoned")
            .values()
            .filter(|j| j.video_id == video_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.resolution);
        jobs
    }

    /// Applies a partial update; None if the job is gone (video deleted).
    pub fn update_job(&self, id: Uuid, update: JobUpdate) -> Option<TranscodingJob> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let job = jobs.get_mut(&id)?;
        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(progress) = update.progress {
            job.progress = progress;
        }
        if let Some(path) = update.output_path {
            job.output_path = Some(path);
        }
        if let Some(message) = update.error_message {
            job.error_message = Some(message);
        }
        if let Some(at) = update.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = update.completed_at {
            job.completed_at = Some(at);
        }
        Some(job.clone())
    }

    /// Job counts by status.
    pub fn queue_stats(&self) -> QueueStats {
        let jobs = self.jobs.lock().expect("jobs lock poisoned");
        let mut stats = QueueStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.waiting += 1,
                JobStatus::Processing => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
impl StateStore {
    /// Test helper: swaps in a session record wholesale (e.g. with a
    /// back-dated expiry).
    pub fn replace_session(&self, session: UploadSession) {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .insert(session.id, session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_video() -> (StateStore, Video) {
        let store = StateStore::new();
        let video = store.create_video("clip.mp4".to_string(), 5_000_000, "video/mp4".to_string());
        (store, video)
    }

    #[test]
    fn test_video_crud() {
        let (store, video) = store_with_video();
        assert!(store.get_video(video.id).is_some());

        let updated = store
            .update_video(
                video.id,
                VideoUpdate {
                    status: Some(VideoStatus::Queued),
                    upload_progress: Some(100.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, VideoStatus::Queued);
        assert_eq!(updated.upload_progress, 100.0);

        assert!(store.delete_video(video.id).is_some());
        assert!(store.get_video(video.id).is_none());
        assert!(store.update_video(video.id, VideoUpdate::default()).is_none());
    }

    #[test]
    fn test_list_videos_newest_first() {
        let store = StateStore::new();
        let a = store.create_video("a.mp4".to_string(), 1, "video/mp4".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = store.create_video("b.mp4".to_string(), 1, "video/mp4".to_string());

        let listed = store.list_videos();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }

    #[test]
    fn test_mark_chunk_received_idempotent_and_progress() {
        let (store, video) = store_with_video();
        let session =
            store.create_session(video.id, "clip.mp4".to_string(), 4 * 1024 * 1024, 2 * 1024 * 1024);

        let s = store.mark_chunk_received(session.id, 0).unwrap();
        assert_eq!(s.received_chunks.len(), 1);
        assert_eq!(store.get_video(video.id).unwrap().upload_progress, 50.0);

        // Duplicate intake is a no-op on state
        let s = store.mark_chunk_received(session.id, 0).unwrap();
        assert_eq!(s.received_chunks.len(), 1);
        assert_eq!(store.get_video(video.id).unwrap().upload_progress, 50.0);

        let s = store.mark_chunk_received(session.id, 1).unwrap();
        assert!(s.is_complete());
        assert_eq!(store.get_video(video.id).unwrap().upload_progress, 100.0);
    }

    #[test]
    fn test_mark_chunk_received_unknown_session() {
        let store = StateStore::new();
        assert!(store.mark_chunk_received(Uuid::new_v4(), 0).is_none());
    }

    #[test]
    fn test_create_job_unique_per_video_resolution() {
        let (store, video) = store_with_video();
        let first = store.create_job(video.id, Resolution::Low, PathBuf::from("/tmp/in.mp4"));
        let second = store.create_job(video.id, Resolution::Low, PathBuf::from("/tmp/in.mp4"));
        assert_eq!(first.id, second.id);
        assert_eq!(store.jobs_for_video(video.id).len(), 1);
    }

    #[test]
    fn test_complete_resolution_flips_video_only_when_all_done() {
        let (store, video) = store_with_video();
        store.init_transcoding_progress(video.id);

        let v = store
            .complete_resolution(video.id, Resolution::Low, "/stream/x/low/playlist.m3u8".into())
            .unwrap();
        assert_ne!(v.status, VideoStatus::Completed);
        assert_eq!(v.hls_urls.len(), 1);

        store
            .complete_resolution(video.id, Resolution::Medium, "/stream/x/medium/playlist.m3u8".into())
            .unwrap();
        let v = store
            .complete_resolution(video.id, Resolution::High, "/stream/x/high/playlist.m3u8".into())
            .unwrap();
        assert_eq!(v.status, VideoStatus::Completed);
        assert!(v.completed_at.is_some());
        assert!(v.all_resolutions_complete());
    }

    #[test]
    fn test_fail_resolution_marks_video_failed() {
        let (store, video) = store_with_video();
        store.init_transcoding_progress(video.id);

        let v = store
            .fail_resolution(video.id, Resolution::Medium, "encoder exited with 1".into())
            .unwrap();
        assert_eq!(v.status, VideoStatus::Failed);
        assert!(v.error_message.unwrap().contains("medium"));

        // Completing the remaining resolutions keeps the terminal Failed state
        store
            .complete_resolution(video.id, Resolution::Low, "/stream/x/low/playlist.m3u8".into())
            .unwrap();
        store
            .complete_resolution(video.id, Resolution::High, "/stream/x/high/playlist.m3u8".into())
            .unwrap();
        let v = store.get_video(video.id).unwrap();
        assert_eq!(v.status, VideoStatus::Failed);
        assert_eq!(v.hls_urls.len(), 2);
    }

    #[test]
    fn test_delete_video_removes_jobs() {
        let (store, video) = store_with_video();
        for resolution in Resolution::ALL {
            store.create_job(video.id, resolution, PathBuf::from("/tmp/in.mp4"));
        }
        assert_eq!(store.jobs_for_video(video.id).len(), 3);

        store.delete_video(video.id);
        assert!(store.jobs_for_video(video.id).is_empty());
        // Late worker writes become no-ops
        assert!(store
            .set_transcoding_progress(video.id, Resolution::Low, 50)
            .is_none());
    }

    #[test]
    fn test_queue_stats() {
        let (store, video) = store_with_video();
        let low = store.create_job(video.id, Resolution::Low, PathBuf::from("/tmp/in.mp4"));
        store.create_job(video.id, Resolution::Medium, PathBuf::from("/tmp/in.mp4"));
        let high = store.create_job(video.id, Resolution::High, PathBuf::from("/tmp/in.mp4"));

        store.update_job(
            low.id,
            JobUpdate {
                status: Some(JobStatus::Processing),
                ..Default::default()
            },
        );
        store.update_job(
            high.id,
            JobUpdate {
                status: Some(JobStatus::Failed),
                ..Default::default()
            },
        );

        let stats = store.queue_stats();
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_session_lifecycle() {
        let (store, video) = store_with_video();
        let session = store.create_session(video.id, "clip.mp4".to_string(), 1024, 512);
        assert_eq!(store.active_session_count(), 1);

        store.set_session_status(session.id, UploadStatus::Completed);
        assert_eq!(store.active_session_count(), 0);

        assert!(store.remove_session(session.id).is_some());
        assert!(store.get_session(session.id).is_none());
    }
}
