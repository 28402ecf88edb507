use crate::app::state::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models::Resolution;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// GET /stream/:video_id/:resolution/playlist.m3u8
pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path((video_id, resolution)): Path<(Uuid, String)>,
) -> ServiceResult<impl IntoResponse> {
    let resolution = parse_resolution(&resolution)?;
    let path = state.layout.playlist_path(video_id, resolution);
    serve_file(&path, PLAYLIST_CONTENT_TYPE).await
}

/// GET /stream/:video_id/:resolution/:segment
pub async fn get_segment(
    State(state): State<Arc<AppState>>,
    Path((video_id, resolution, segment)): Path<(Uuid, String, String)>,
) -> ServiceResult<impl IntoResponse> {
    let resolution = parse_resolution(&resolution)?;
    validate_segment_name(&segment)?;
    let path = state
        .layout
        .resolution_dir(video_id, resolution)
        .join(&segment);
    serve_file(&path, SEGMENT_CONTENT_TYPE).await
}

fn parse_resolution(raw: &str) -> Result<Resolution, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::NotFound(format!("Unknown resolution: {}", raw)))
}

/// Segment names come from playlists the service wrote itself; anything
/// else is rejected before it can reach the filesystem.
fn validate_segment_name(segment: &str) -> Result<(), ServiceError> {
    let well_formed = segment.starts_with("segment_")
        && segment.ends_with(".ts")
        && !segment.contains('/')
        && !segment.contains('\\')
        && !segment.contains("..");
    if well_formed {
        Ok(())
    } else {
        Err(ServiceError::NotFound(format!(
            "Unknown segment: {}",
            segment
        )))
    }
}

async fn serve_file(
    path: &std::path::Path,
    content_type: &'static str,
) -> ServiceResult<impl IntoResponse> {
    let body = tokio::fs::read(path).await.map_err(|_| {
        debug!(path = %path.display(), "Streaming file absent");
        ServiceError::NotFound("File not found".to_string())
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    Ok((headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_segment_name() {
        assert!(validate_segment_name("segment_000.ts").is_ok());
        assert!(validate_segment_name("segment_123.ts").is_ok());

        assert!(validate_segment_name("playlist.m3u8").is_err());
        assert!(validate_segment_name("../secret.ts").is_err());
        assert!(validate_segment_name("segment_..%2f.ts").is_err());
        assert!(validate_segment_name("dir/segment_000.ts").is_err());
    }

    #[test]
    fn test_parse_resolution() {
        assert!(parse_resolution("low").is_ok());
        assert!(parse_resolution("medium").is_ok());
        assert!(parse_resolution("high").is_ok());
        assert!(parse_resolution("720p").is_err());
    }
}
