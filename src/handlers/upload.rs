use crate::app::state::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models::UploadSession;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub filename: String,
    pub total_size: u64,
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub success: bool,
    pub uploaded_chunks: usize,
    pub total_chunks: u32,
    pub progress: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub session_id: Uuid,
}

/// POST /upload/session
#[instrument(skip(state))]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> ServiceResult<Json<UploadSession>> {
    let session = state
        .upload
        .initiate_upload(request.filename, request.total_size, request.mime_type)
        .await?;
    Ok(Json(session))
}

/// GET /upload/session/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> ServiceResult<Json<UploadSession>> {
    let session = state.upload.get_session(session_id)?;
    Ok(Json(session))
}

/// DELETE /upload/session/:id
#[instrument(skip(state))]
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> ServiceResult<Json<Value>> {
    state.upload.cancel_session(session_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// POST /upload/chunk — multipart with `sessionId`, `chunkIndex`, and the
/// chunk body in a `chunk` (or `file`) part.
#[instrument(skip(state, multipart))]
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ServiceResult<Json<ChunkUploadResponse>> {
    let (session_id, chunk_index, body) = parse_chunk_multipart(multipart).await?;

    let result = state
        .upload
        .process_chunk(session_id, chunk_index, body)
        .await?;

    Ok(Json(ChunkUploadResponse {
        success: true,
        uploaded_chunks: result.uploaded_chunks,
        total_chunks: result.total_chunks,
        progress: result.progress_percentage,
    }))
}

/// POST /upload/complete
#[instrument(skip(state))]
pub async fn complete_upload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompleteUploadRequest>,
) -> ServiceResult<Json<Value>> {
    let video_id = state.upload.complete_upload(request.session_id).await?;
    Ok(Json(json!({ "success": true, "videoId": video_id })))
}

/// Pulls the three expected parts out of the multipart body.
async fn parse_chunk_multipart(
    mut multipart: Multipart,
) -> Result<(Uuid, u32, Bytes), ServiceError> {
    let mut session_id: Option<Uuid> = None;
    let mut chunk_index: Option<u32> = None;
    let mut body: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "sessionId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::Validation(format!("Bad sessionId field: {}", e)))?;
                session_id = Some(
                    text.parse()
                        .map_err(|_| ServiceError::Validation("sessionId is not a UUID".into()))?,
                );
            }
            "chunkIndex" => {
                let text = field.text().await.map_err(|e| {
                    ServiceError::Validation(format!("Bad chunkIndex field: {}", e))
                })?;
                chunk_index = Some(text.parse().map_err(|_| {
                    ServiceError::Validation("chunkIndex is not a non-negative integer".into())
                })?);
            }
            "chunk" | "file" => {
                body = Some(field.bytes().await.map_err(|e| {
                    ServiceError::Validation(format!("Failed to read chunk body: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let session_id =
        session_id.ok_or_else(|| ServiceError::Validation("Missing sessionId field".into()))?;
    let chunk_index =
        chunk_index.ok_or_else(|| ServiceError::Validation("Missing chunkIndex field".into()))?;
    let body = body.ok_or_else(|| ServiceError::Validation("Missing chunk field".into()))?;

    Ok((session_id, chunk_index, body))
}
