use super::errors::{Result, StorageError};
use crate::models::Resolution;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix for transient files created while a multipart body is draining.
pub const TEMP_PREFIX: &str = "temp_";

/// StorageLayout owns the directory discipline under the configured root:
///
/// - `chunks/<sessionId>/chunk_<index>` — received chunks
/// - `chunks/temp_<random>` — in-flight bodies before promotion
/// - `uploads/<videoId><ext>` — assembled source files
/// - `transcoded/<videoId>/<resolution>/` — encoder outputs
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.root.join("chunks")
    }

    pub fn session_chunk_dir(&self, session_id: Uuid) -> PathBuf {
        self.chunks_dir().join(session_id.to_string())
    }

    pub fn chunk_path(&self, session_id: Uuid, chunk_index: u32) -> PathBuf {
        self.session_chunk_dir(session_id)
            .join(format!("chunk_{}", chunk_index))
    }

    fn temp_chunk_path(&self) -> PathBuf {
        self.chunks_dir()
            .join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    /// Assembled source path, preserving the original extension.
    pub fn upload_path(&self, video_id: Uuid, extension: &str) -> PathBuf {
        self.uploads_dir()
            .join(format!("{}{}", video_id, extension))
    }

    pub fn transcoded_dir(&self) -> PathBuf {
        self.root.join("transcoded")
    }

    pub fn video_transcoded_dir(&self, video_id: Uuid) -> PathBuf {
        self.transcoded_dir().join(video_id.to_string())
    }

    pub fn resolution_dir(&self, video_id: Uuid, resolution: Resolution) -> PathBuf {
        self.video_transcoded_dir(video_id)
            .join(resolution.as_str())
    }

    pub fn playlist_path(&self, video_id: Uuid, resolution: Resolution) -> PathBuf {
        self.resolution_dir(video_id, resolution).join("playlist.m3u8")
    }

    /// Creates the three top-level trees. Called once at startup.
    pub async fn ensure_directories(&self) -> Result<()> {
        for dir in [self.chunks_dir(), self.uploads_dir(), self.transcoded_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| StorageError::from_io(e, "creating storage tree"))?;
        }
        Ok(())
    }

    /// Writes one chunk body atomically: stream to a `temp_*` file in the
    /// chunks directory, then rename into the per-session directory. The
    /// rename stays within one filesystem, so retries and concurrent writes
    /// of the same index cannot leave a torn chunk behind.
    pub async fn write_chunk(&self, session_id: Uuid, chunk_index: u32, body: &[u8]) -> Result<()> {
        let temp_path = self.temp_chunk_path();

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::from_io(e, "creating temp chunk"))?;
        if let Err(e) = file.write_all(body).await {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(e, "writing chunk body"));
        }
        if let Err(e) = file.flush().await {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(e, "flushing chunk body"));
        }
        drop(file);

        let session_dir = self.session_chunk_dir(session_id);
        if let Err(e) = fs::create_dir_all(&session_dir).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(e, "creating session chunk dir"));
        }

        let final_path = self.chunk_path(session_id, chunk_index);
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(e, "promoting chunk"));
        }

        debug!(
            session_id = %session_id,
            chunk_index = chunk_index,
            bytes = body.len(),
            "Chunk written"
        );
        Ok(())
    }

    /// Bytes currently available on the filesystem holding the root.
    pub fn available_space(&self) -> u64 {
        match fs2::available_space(&self.root) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Free-space probe failed, assuming plenty");
                u64::MAX
            }
        }
    }

    /// Sizes of the three trees plus the count of in-flight temp files.
    pub fn stats(&self) -> StorageStats {
        let chunks_bytes = dir_size(&self.chunks_dir());
        let uploads_bytes = dir_size(&self.uploads_dir());
        let transcoded_bytes = dir_size(&self.transcoded_dir());
        StorageStats {
            chunks_mb: to_mb(chunks_bytes),
            uploads_mb: to_mb(uploads_bytes),
            transcoded_mb: to_mb(transcoded_bytes),
            total_mb: to_mb(chunks_bytes + uploads_bytes + transcoded_bytes),
            temp_files: self.temp_file_count(),
        }
    }

    fn temp_file_count(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(self.chunks_dir()) else {
            return 0;
        };
        entries
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(TEMP_PREFIX)
            })
            .count()
    }
}

/// Aggregate on-disk usage, reported in megabytes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    #[serde(rename = "chunksMB")]
    pub chunks_mb: f64,
    #[serde(rename = "uploadsMB")]
    pub uploads_mb: f64,
    #[serde(rename = "transcodedMB")]
    pub transcoded_mb: f64,
    #[serde(rename = "totalMB")]
    pub total_mb: f64,
    pub temp_files: usize,
}

fn to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Recursive directory size; missing trees count as zero.
fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}
