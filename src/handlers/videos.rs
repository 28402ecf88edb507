use crate::app::state::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models::Video;
use crate::store::QueueStats;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// GET /videos — newest first
pub async fn list_videos(State(state): State<Arc<AppState>>) -> Json<Vec<Video>> {
    Json(state.store.list_videos())
}

/// GET /videos/:id
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<Uuid>,
) -> ServiceResult<Json<Video>> {
    state
        .store
        .get_video(video_id)
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("Video not found: {}", video_id)))
}

/// DELETE /videos/:id — removes on-disk artifacts and state
#[instrument(skip(state))]
pub async fn delete_video(
    State(state): State<Arc<AppState>>,
    Path(video_id): Path<Uuid>,
) -> ServiceResult<Json<Value>> {
    state.upload.delete_video(video_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /queue/stats
pub async fn queue_stats(State(state): State<Arc<AppState>>) -> Json<QueueStats> {
    Json(state.store.queue_stats())
}
