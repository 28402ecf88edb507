use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// UploadStatus represents the current state of an upload session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Active,
    Completed,
    Expired,
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStatus::Active => write!(f, "active"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UploadStatus::Active),
            "completed" => Ok(UploadStatus::Completed),
            "expired" => Ok(UploadStatus::Expired),
            _ => Err(format!("Invalid upload status: {}", s)),
        }
    }
}

/// UploadSession tracks one chunked upload: which chunk indices have landed
/// on disk and when the bookkeeping expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: Uuid,
    pub video_id: Uuid,
    pub filename: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    /// Indices in [0, total_chunks) that have been durably received.
    pub received_chunks: BTreeSet<u32>,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    /// Session expiration in hours
    pub const EXPIRATION_HOURS: i64 = 24;

    /// Creates a new active session for the given video.
    pub fn new(video_id: Uuid, filename: String, total_size: u64, chunk_size: u64) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            video_id,
            filename,
            total_size,
            chunk_size,
            total_chunks: Self::calculate_total_chunks(total_size, chunk_size),
            received_chunks: BTreeSet::new(),
            status: UploadStatus::Active,
            created_at,
            expires_at: created_at + Duration::hours(Self::EXPIRATION_HOURS),
        }
    }

    /// Calculates the number of chunks needed for a file
    pub fn calculate_total_chunks(total_size: u64, chunk_size: u64) -> u32 {
        if chunk_size == 0 {
            return 0;
        }
        ((total_size + chunk_size - 1) / chunk_size) as u32
    }

    /// Calculates upload progress percentage
    pub fn progress_percentage(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        (self.received_chunks.len() as f64 / self.total_chunks as f64) * 100.0
    }

    /// Checks if the session has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Checks if all chunks have been received
    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() as u32 == self.total_chunks
    }

    /// Indices in [0, total_chunks) not yet received, capped at `limit`.
    pub fn missing_chunks(&self, limit: usize) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received_chunks.contains(i))
            .take(limit)
            .collect()
    }

    /// Validates chunk index is within valid range
    pub fn validate_chunk_index(&self, chunk_index: u32) -> Result<(), String> {
        if chunk_index >= self.total_chunks {
            Err(format!(
                "Chunk index {} exceeds total chunks {}",
                chunk_index, self.total_chunks
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total_size: u64, chunk_size: u64) -> UploadSession {
        UploadSession::new(Uuid::new_v4(), "test.mp4".to_string(), total_size, chunk_size)
    }

    #[test]
    fn test_upload_status_from_str() {
        assert_eq!("active".parse::<UploadStatus>().unwrap(), UploadStatus::Active);
        assert_eq!(
            "completed".parse::<UploadStatus>().unwrap(),
            UploadStatus::Completed
        );
        assert_eq!("expired".parse::<UploadStatus>().unwrap(), UploadStatus::Expired);
        assert!("cancelled".parse::<UploadStatus>().is_err());
    }

    #[test]
    fn test_calculate_total_chunks() {
        let chunk = 2 * 1024 * 1024;
        assert_eq!(UploadSession::calculate_total_chunks(chunk, chunk), 1);
        assert_eq!(UploadSession::calculate_total_chunks(chunk + 1, chunk), 2);
        assert_eq!(UploadSession::calculate_total_chunks(5_000_000, 2_097_152), 3);
        assert_eq!(UploadSession::calculate_total_chunks(0, chunk), 0);
    }

    #[test]
    fn test_progress_percentage() {
        let mut s = session(4 * 1024 * 1024, 2 * 1024 * 1024);
        assert_eq!(s.total_chunks, 2);
        assert_eq!(s.progress_percentage(), 0.0);

        s.received_chunks.insert(0);
        assert_eq!(s.progress_percentage(), 50.0);

        s.received_chunks.insert(1);
        assert_eq!(s.progress_percentage(), 100.0);
    }

    #[test]
    fn test_received_chunks_idempotent() {
        let mut s = session(4 * 1024 * 1024, 2 * 1024 * 1024);
        assert!(s.received_chunks.insert(0));
        assert!(!s.received_chunks.insert(0));
        assert_eq!(s.received_chunks.len(), 1);
    }

    #[test]
    fn test_is_expired() {
        let mut s = session(1024, 512);
        assert!(!s.is_expired());

        s.expires_at = Utc::now() - Duration::hours(1);
        assert!(s.is_expired());
    }

    #[test]
    fn test_missing_chunks() {
        let mut s = session(6 * 1024 * 1024, 2 * 1024 * 1024);
        assert_eq!(s.missing_chunks(10), vec![0, 1, 2]);

        s.received_chunks.insert(1);
        assert_eq!(s.missing_chunks(10), vec![0, 2]);

        s.received_chunks.insert(0);
        s.received_chunks.insert(2);
        assert!(s.missing_chunks(10).is_empty());
        assert!(s.is_complete());
    }

    #[test]
    fn test_missing_chunks_cap() {
        let s = session(100 * 1024 * 1024, 2 * 1024 * 1024);
        assert_eq!(s.total_chunks, 50);
        assert_eq!(s.missing_chunks(10).len(), 10);
    }

    #[test]
    fn test_validate_chunk_index() {
        let s = session(4 * 1024 * 1024, 2 * 1024 * 1024);
        assert!(s.validate_chunk_index(0).is_ok());
        assert!(s.validate_chunk_index(1).is_ok());
        assert!(s.validate_chunk_index(2).is_err());
    }
}
