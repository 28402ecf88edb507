use crate::models::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Lifecycle phase an event announces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    UploadCompleted,
    TranscodingStarted,
    TranscodingProgress,
    TranscodingCompleted,
    TranscodingFailed,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::UploadCompleted => write!(f, "upload-completed"),
            EventType::TranscodingStarted => write!(f, "transcoding-started"),
            EventType::TranscodingProgress => write!(f, "transcoding-progress"),
            EventType::TranscodingCompleted => write!(f, "transcoding-completed"),
            EventType::TranscodingFailed => write!(f, "transcoding-failed"),
        }
    }
}

/// A phase transition on a specific video, as published to subscribers and
/// to the broker channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub video_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl VideoEvent {
    pub fn new(event_type: EventType, video_id: Uuid, data: Option<serde_json::Value>) -> Self {
        Self {
            event_type,
            video_id,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn upload_completed(video_id: Uuid) -> Self {
        Self::new(EventType::UploadCompleted, video_id, None)
    }

    pub fn transcoding_started(video_id: Uuid, resolution: Resolution) -> Self {
        Self::new(
            EventType::TranscodingStarted,
            video_id,
            Some(json!({ "resolution": resolution })),
        )
    }

    pub fn transcoding_progress(video_id: Uuid, resolution: Resolution, progress: u8) -> Self {
        Self::new(
            EventType::TranscodingProgress,
            video_id,
            Some(json!({ "resolution": resolution, "progress": progress })),
        )
    }

    pub fn transcoding_completed(video_id: Uuid, resolution: Resolution, playlist_url: &str) -> Self {
        Self::new(
            EventType::TranscodingCompleted,
            video_id,
            Some(json!({ "resolution": resolution, "playlistUrl": playlist_url })),
        )
    }

    pub fn transcoding_failed(video_id: Uuid, resolution: Resolution, error: &str) -> Self {
        Self::new(
            EventType::TranscodingFailed,
            video_id,
            Some(json!({ "resolution": resolution, "error": error })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventType::UploadCompleted).unwrap(),
            "\"upload-completed\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::TranscodingProgress).unwrap(),
            "\"transcoding-progress\""
        );
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = VideoEvent::transcoding_progress(Uuid::new_v4(), Resolution::Low, 45);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transcoding-progress");
        assert!(json.get("videoId").is_some());
        assert_eq!(json["data"]["resolution"], "low");
        assert_eq!(json["data"]["progress"], 45);
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_event_roundtrip() {
        let event = VideoEvent::transcoding_failed(Uuid::new_v4(), Resolution::Medium, "exit 1");
        let json = serde_json::to_string(&event).unwrap();
        let back: VideoEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, EventType::TranscodingFailed);
        assert_eq!(back.video_id, event.video_id);
    }
}
