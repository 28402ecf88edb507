use super::errors::UploadError;
use super::validator::FileValidator;
use crate::config::UploadConfig;
use crate::events::{EventBus, VideoEvent};
use crate::models::{Resolution, UploadSession, UploadStatus, VideoStatus};
use crate::storage::{StorageGc, StorageLayout};
use crate::store::{StateStore, VideoUpdate};
use crate::transcoding::JobQueue;
use bytes::Bytes;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Missing indices reported back on an incomplete `complete` call.
const MISSING_CHUNKS_CAP: usize = 10;

/// Result of one chunk intake.
#[derive(Debug, Clone)]
pub struct ChunkUploadResult {
    pub uploaded_chunks: usize,
    pub total_chunks: u32,
    pub progress_percentage: f64,
}

/// UploadHandler coordinates chunked uploads end to end: session lifecycle,
/// idempotent chunk intake, assembly, and the hand-off into transcoding.
#[derive(Clone)]
pub struct UploadHandler {
    store: Arc<StateStore>,
    layout: StorageLayout,
    bus: Arc<EventBus>,
    queue: Arc<JobQueue>,
    gc: Arc<StorageGc>,
    config: UploadConfig,
    min_free_bytes: u64,
}

impl UploadHandler {
    pub fn new(
        store: Arc<StateStore>,
        layout: StorageLayout,
        bus: Arc<EventBus>,
        queue: Arc<JobQueue>,
        gc: Arc<StorageGc>,
        config: UploadConfig,
        min_free_bytes: u64,
    ) -> Self {
        Self {
            store,
            layout,
            bus,
            queue,
            gc,
            config,
            min_free_bytes,
        }
    }

    /// Opens a new upload session and its backing video record.
    #[instrument(skip(self))]
    pub async fn initiate_upload(
        &self,
        filename: String,
        total_size: u64,
        mime_type: String,
    ) -> Result<UploadSession, UploadError> {
        FileValidator::validate_filename(&filename)?;
        FileValidator::validate_mime_type(&mime_type)?;
        FileValidator::validate_file_size(total_size, self.config.max_file_size_bytes)?;

        let video = self
            .store
            .create_video(filename.clone(), total_size, mime_type);
        let session =
            self.store
                .create_session(video.id, filename, total_size, self.config.chunk_size_bytes);

        info!(
            session_id = %session.id,
            video_id = %video.id,
            total_chunks = session.total_chunks,
            "Upload session created"
        );
        Ok(session)
    }

    pub fn get_session(&self, session_id: Uuid) -> Result<UploadSession, UploadError> {
        self.store
            .get_session(session_id)
            .ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))
    }

    /// Ingests one chunk: free-space preflight, validation, atomic write,
    /// idempotent bookkeeping. Re-posting a known index succeeds without
    /// changing state.
    #[instrument(skip(self, body))]
    pub async fn process_chunk(
        &self,
        session_id: Uuid,
        chunk_index: u32,
        body: Bytes,
    ) -> Result<ChunkUploadResult, UploadError> {
        self.ensure_free_space().await?;

        let session = self.get_session(session_id)?;
        if session.is_expired() || session.status != UploadStatus::Active {
            return Err(UploadError::SessionExpired(session_id.to_string()));
        }
        session
            .validate_chunk_index(chunk_index)
            .map_err(UploadError::InvalidChunkIndex)?;
        if body.is_empty() {
            return Err(UploadError::EmptyChunk);
        }
        if body.len() as u64 > self.config.max_chunk_bytes {
            return Err(UploadError::ChunkTooLarge(
                body.len(),
                self.config.max_chunk_bytes,
            ));
        }

        match self.layout.write_chunk(session_id, chunk_index, &body).await {
            Ok(()) => {}
            Err(crate::storage::StorageError::StorageFull(msg)) => {
                // Reclaim synchronously, then let the client retry.
                warn!(session_id = %session_id, "Chunk write hit full storage, running GC");
                self.gc.run().await;
                return Err(UploadError::StorageFull(msg));
            }
            Err(other) => return Err(other.into()),
        }

        let session = self
            .store
            .mark_chunk_received(session_id, chunk_index)
            .ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))?;

        debug!(
            session_id = %session_id,
            chunk_index = chunk_index,
            received = session.received_chunks.len(),
            total = session.total_chunks,
            "Chunk received"
        );

        Ok(ChunkUploadResult {
            uploaded_chunks: session.received_chunks.len(),
            total_chunks: session.total_chunks,
            progress_percentage: session.progress_percentage(),
        })
    }

    /// Assembles the chunks into the final source file and fans out the
    /// three transcoding jobs.
    #[instrument(skip(self))]
    pub async fn complete_upload(&self, session_id: Uuid) -> Result<Uuid, UploadError> {
        let session = self.get_session(session_id)?;

        match session.status {
            UploadStatus::Active => {}
            // Retried completion after success is a no-op.
            UploadStatus::Completed => return Ok(session.video_id),
            UploadStatus::Expired => {
                return Err(UploadError::SessionExpired(session_id.to_string()))
            }
        }

        if !session.is_complete() {
            return Err(UploadError::IncompleteUpload {
                received: session.received_chunks.len(),
                total: session.total_chunks,
                missing: session.missing_chunks(MISSING_CHUNKS_CAP),
            });
        }

        let video = self
            .store
            .get_video(session.video_id)
            .ok_or_else(|| UploadError::VideoNotFound(session.video_id.to_string()))?;

        let output_path = self.layout.upload_path(video.id, &video.extension());
        if let Err(e) = self.assemble(&session, &output_path).await {
            warn!(session_id = %session_id, error = %e, "Assembly failed, removing partial output");
            let _ = fs::remove_file(&output_path).await;
            return Err(e);
        }

        // Chunks are no longer needed once the file exists.
        let _ = fs::remove_dir_all(self.layout.session_chunk_dir(session_id)).await;
        self.store
            .set_session_status(session_id, UploadStatus::Completed);
        self.store.update_video(
            video.id,
            VideoUpdate {
                status: Some(VideoStatus::UploadCompleted),
                upload_progress: Some(100.0),
                ..Default::default()
            },
        );
        self.bus.emit(VideoEvent::upload_completed(video.id));

        // One job per resolution, each with its output directory ready.
        for resolution in Resolution::ALL {
            fs::create_dir_all(self.layout.resolution_dir(video.id, resolution)).await?;
            let job = self
                .store
                .create_job(video.id, resolution, output_path.clone());
            self.queue.submit(&job);
        }
        self.store.init_transcoding_progress(video.id);
        self.store.update_video(
            video.id,
            VideoUpdate {
                status: Some(VideoStatus::Queued),
                ..Default::default()
            },
        );

        info!(
            session_id = %session_id,
            video_id = %video.id,
            "Upload completed, transcoding queued"
        );
        Ok(video.id)
    }

    /// Streams chunks 0..total into the destination in index order and
    /// verifies the assembled length matches the declared size.
    async fn assemble(
        &self,
        session: &UploadSession,
        output_path: &std::path::Path,
    ) -> Result<(), UploadError> {
        let file = fs::File::create(output_path).await?;
        let mut writer = BufWriter::new(file);
        let mut written: u64 = 0;

        for chunk_index in 0..session.total_chunks {
            let chunk_path = self.layout.chunk_path(session.id, chunk_index);
            let mut reader = fs::File::open(&chunk_path).await?;
            written += tokio::io::copy(&mut reader, &mut writer).await?;
        }
        writer.flush().await?;

        if written != session.total_size {
            return Err(UploadError::SizeMismatch {
                actual: written,
                expected: session.total_size,
            });
        }

        debug!(
            session_id = %session.id,
            bytes = written,
            chunks = session.total_chunks,
            "Chunks assembled"
        );
        Ok(())
    }

    /// Explicit cancel: the chunk directory goes away immediately and the
    /// session leaves the Active set.
    #[instrument(skip(self))]
    pub async fn cancel_session(&self, session_id: Uuid) -> Result<(), UploadError> {
        let _ = self.get_session(session_id)?;
        let _ = fs::remove_dir_all(self.layout.session_chunk_dir(session_id)).await;
        self.store
            .set_session_status(session_id, UploadStatus::Expired);
        info!(session_id = %session_id, "Upload session cancelled");
        Ok(())
    }

    /// Removes a video's on-disk artifacts, then its records.
    #[instrument(skip(self))]
    pub async fn delete_video(&self, video_id: Uuid) -> Result<(), UploadError> {
        let video = self
            .store
            .get_video(video_id)
            .ok_or_else(|| UploadError::VideoNotFound(video_id.to_string()))?;

        let _ = fs::remove_dir_all(self.layout.video_transcoded_dir(video_id)).await;
        let upload_path = self.layout.upload_path(video_id, &video.extension());
        let _ = fs::remove_file(&upload_path).await;

        self.store.delete_video(video_id);
        info!(video_id = %video_id, "Video deleted");
        Ok(())
    }

    /// Opportunistic preflight: run GC when the free-space estimate is under
    /// the threshold, and fail with a retryable storage error if that did
    /// not help.
    async fn ensure_free_space(&self) -> Result<(), UploadError> {
        if self.layout.available_space() >= self.min_free_bytes {
            return Ok(());
        }
        warn!("Free space below threshold, running GC before chunk write");
        self.gc.run().await;
        if self.layout.available_space() < self.min_free_bytes {
            return Err(UploadError::StorageFull(
                "Insufficient free space for chunk".to_string(),
            ));
        }
        Ok(())
    }
}
