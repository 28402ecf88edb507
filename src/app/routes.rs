//! Application routing configuration.
//!
//! Defines all HTTP routes and their handlers.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tracing::info;

use super::state::AppState;
use crate::handlers::health::health_handler;
use crate::handlers::storage::{storage_cleanup, storage_stats};
use crate::handlers::streaming::{get_playlist, get_segment};
use crate::handlers::upload::{
    cancel_session, complete_upload, create_session, get_session, upload_chunk,
};
use crate::handlers::videos::{delete_video, get_video, list_videos, queue_stats};
use crate::handlers::ws::ws_handler;

/// Create the application router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    info!("Creating application router");

    // Multipart framing overhead on top of the largest accepted chunk.
    let chunk_body_limit = state.config.upload.max_chunk_bytes as usize + 64 * 1024;

    let upload_router = Router::new()
        .route("/upload/session", post(create_session))
        .route(
            "/upload/session/:id",
            get(get_session).delete(cancel_session),
        )
        .route(
            "/upload/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route("/upload/complete", post(complete_upload));

    let video_router = Router::new()
        .route("/videos", get(list_videos))
        .route("/videos/:id", get(get_video).delete(delete_video))
        .route("/queue/stats", get(queue_stats));

    let storage_router = Router::new()
        .route("/storage/cleanup", post(storage_cleanup))
        .route("/storage/stats", get(storage_stats));

    let streaming_router = Router::new()
        .route("/stream/:video_id/:resolution/playlist.m3u8", get(get_playlist))
        .route("/stream/:video_id/:resolution/:segment", get(get_segment));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .merge(upload_router)
        .merge(video_router)
        .merge(storage_router)
        .merge(streaming_router)
        .with_state(state)
}
