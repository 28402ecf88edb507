use crate::app::state::AppState;
use crate::error::{ServiceError, ServiceResult};
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::instrument;

/// POST /storage/cleanup — one synchronous GC pass
#[instrument(skip(state))]
pub async fn storage_cleanup(State(state): State<Arc<AppState>>) -> ServiceResult<Json<Value>> {
    let report = state.gc.run().await;
    let stats = disk_stats(&state).await?;
    Ok(Json(json!({
        "cleaned": report.total(),
        "storage": stats,
    })))
}

/// GET /storage/stats
pub async fn storage_stats(State(state): State<Arc<AppState>>) -> ServiceResult<Json<Value>> {
    let stats = disk_stats(&state).await?;
    let mut body = serde_json::to_value(stats)
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    body["activeSessions"] = json!(state.store.active_session_count());
    Ok(Json(body))
}

/// Directory walking happens off the async runtime.
async fn disk_stats(state: &Arc<AppState>) -> Result<crate::storage::StorageStats, ServiceError> {
    let layout = state.layout.clone();
    tokio::task::spawn_blocking(move || layout.stats())
        .await
        .map_err(|e| ServiceError::Internal(format!("Stats task failed: {}", e)))
}
