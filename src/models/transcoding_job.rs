use super::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// JobStatus represents the current state of a transcoding job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// TranscodingJob is one unit of work: one video at one target resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodingJob {
    pub id: Uuid,
    pub video_id: Uuid,
    pub resolution: Resolution,
    pub status: JobStatus,
    /// Transcode percent, 0-100.
    pub progress: u8,
    pub input_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TranscodingJob {
    /// Maximum number of execution attempts before the job is Failed
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Creates a pending job for one (video, resolution) pair.
    pub fn new(video_id: Uuid, resolution: Resolution, input_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_id,
            resolution,
            status: JobStatus::Pending,
            progress: 0,
            input_path,
            output_path: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Checks if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    /// Processing duration, if the job has started.
    pub fn processing_duration(&self) -> Option<chrono::Duration> {
        self.started_at.map(|start| {
            let end = self.completed_at.unwrap_or_else(Utc::now);
            end.signed_duration_since(start)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TranscodingJob {
        TranscodingJob::new(Uuid::new_v4(), Resolution::Low, PathBuf::from("/tmp/in.mp4"))
    }

    #[test]
    fn test_job_status_from_str() {
        assert_eq!("pending".parse::<JobStatus>().unwrap(), JobStatus::Pending);
        assert_eq!(
            "processing".parse::<JobStatus>().unwrap(),
            JobStatus::Processing
        );
        assert_eq!("completed".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert_eq!("failed".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!("queued".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_new_job_defaults() {
        let j = job();
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.progress, 0);
        assert!(j.output_path.is_none());
        assert!(j.started_at.is_none());
        assert!(!j.is_terminal());
    }

    #[test]
    fn test_is_terminal() {
        let mut j = job();
        j.status = JobStatus::Completed;
        assert!(j.is_terminal());
        j.status = JobStatus::Failed;
        assert!(j.is_terminal());
        j.status = JobStatus::Processing;
        assert!(!j.is_terminal());
    }

    #[test]
    fn test_processing_duration() {
        let mut j = job();
        assert!(j.processing_duration().is_none());

        let now = Utc::now();
        j.started_at = Some(now - chrono::Duration::seconds(90));
        j.completed_at = Some(now);
        assert_eq!(j.processing_duration().unwrap().num_seconds(), 90);
    }
}
