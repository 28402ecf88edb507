//! HTTP server setup and lifecycle.
//!
//! Builds the router with middleware, starts the background tasks, and
//! handles graceful shutdown.

use super::routes::create_router;
use super::state::AppState;
use crate::transcoding::{start_dispatcher, StartRateLimiter, TranscodingWorker};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Start the HTTP server and run until a shutdown signal arrives.
pub async fn start_server(
    state: Arc<AppState>,
    worker: Arc<TranscodingWorker>,
) -> anyhow::Result<()> {
    let background = start_background_tasks(&state, worker);

    let app = create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        // Streaming URLs are consumed by players on other origins.
        .layer(CorsLayer::permissive());

    let bind_addr = SocketAddr::new(
        state.config.server.host.parse()?,
        state.config.server.port,
    );
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;

    info!("Server stopped, aborting background tasks");
    for handle in background {
        handle.abort();
    }

    Ok(())
}

/// GC timer and the transcoding dispatcher.
fn start_background_tasks(
    state: &Arc<AppState>,
    worker: Arc<TranscodingWorker>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let gc_handle = state.gc.clone().start(state.config.gc_interval());
    info!(
        interval_seconds = state.config.storage.gc_interval_seconds,
        "Storage GC task started"
    );

    let limiter = Arc::new(StartRateLimiter::new(
        state.config.transcoding.max_starts_per_window,
        state.config.start_window(),
    ));
    let dispatcher_handle = start_dispatcher(
        state.queue.clone(),
        worker,
        state.config.transcoding.max_concurrent_jobs,
        limiter,
    );

    vec![gc_handle, dispatcher_handle]
}

async fn wait_for_shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal (Ctrl+C)"),
        Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
    }
}
