use super::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// VideoStatus represents the lifecycle state of a video
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Uploading,
    UploadCompleted,
    Queued,
    Transcoding,
    Completed,
    Failed,
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoStatus::Uploading => write!(f, "uploading"),
            VideoStatus::UploadCompleted => write!(f, "upload_completed"),
            VideoStatus::Queued => write!(f, "queued"),
            VideoStatus::Transcoding => write!(f, "transcoding"),
            VideoStatus::Completed => write!(f, "completed"),
            VideoStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploading" => Ok(VideoStatus::Uploading),
            "upload_completed" => Ok(VideoStatus::UploadCompleted),
            "queued" => Ok(VideoStatus::Queued),
            "transcoding" => Ok(VideoStatus::Transcoding),
            "completed" => Ok(VideoStatus::Completed),
            "failed" => Ok(VideoStatus::Failed),
            _ => Err(format!("Invalid video status: {}", s)),
        }
    }
}

/// Video is the aggregate record for one uploaded source file and its
/// transcoded outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub original_filename: String,
    pub total_size: u64,
    pub mime_type: String,
    pub status: VideoStatus,
    /// Upload completion percent, 0-100.
    pub upload_progress: f64,
    /// Per-resolution transcode percent; sparse until jobs are created.
    pub transcoding_progress: HashMap<Resolution, u8>,
    /// Per-resolution playlist URL; present iff the matching job completed.
    pub hls_urls: HashMap<Resolution, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Video {
    /// Creates a new video record in the Uploading state.
    pub fn new(original_filename: String, total_size: u64, mime_type: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_filename,
            total_size,
            mime_type,
            status: VideoStatus::Uploading,
            upload_progress: 0.0,
            transcoding_progress: HashMap::new(),
            hls_urls: HashMap::new(),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Checks whether every resolution has reached 100 percent.
    pub fn all_resolutions_complete(&self) -> bool {
        Resolution::ALL
            .iter()
            .all(|r| self.transcoding_progress.get(r).copied() == Some(100))
    }

    /// Checks if the video is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, VideoStatus::Completed | VideoStatus::Failed)
    }

    /// File extension of the original upload, including the leading dot.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default()
    }
}
