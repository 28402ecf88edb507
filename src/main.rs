use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use video_transcoding_service::app::{self, state::AppState};
use video_transcoding_service::config::Config;
use video_transcoding_service::events::{self, EventBus};
use video_transcoding_service::observability;
use video_transcoding_service::storage::{StorageGc, StorageLayout};
use video_transcoding_service::store::StateStore;
use video_transcoding_service::transcoding::{EncoderDriver, JobQueue, TranscodingWorker};
use video_transcoding_service::upload::UploadHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    observability::init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        storage_root = %config.storage.root.display(),
        port = config.server.port,
        "Starting video transcoding service"
    );

    let layout = StorageLayout::new(config.storage.root.clone());
    layout.ensure_directories().await?;

    let store = Arc::new(StateStore::new());

    let broker = match &config.redis.url {
        Some(url) => events::connect_broker(url).await,
        None => {
            info!("No broker configured, running in local mode");
            None
        }
    };

    let bus = Arc::new(
        EventBus::local_only(config.redis.event_channel.clone()).with_broker(broker.clone()),
    );
    let queue = Arc::new(JobQueue::new(config.redis.queue_name.clone()).with_broker(broker));

    let gc = Arc::new(StorageGc::new(
        layout.clone(),
        store.clone(),
        config.temp_ttl(),
        config.orphan_dir_ttl(),
    ));
    // Reclaim anything left behind by a previous process before serving.
    gc.run().await;

    let upload = UploadHandler::new(
        store.clone(),
        layout.clone(),
        bus.clone(),
        queue.clone(),
        gc.clone(),
        config.upload.clone(),
        config.storage.min_free_bytes,
    );

    let worker = Arc::new(TranscodingWorker::new(
        store.clone(),
        layout.clone(),
        bus.clone(),
        EncoderDriver::new(config.transcoding.hls_segment_seconds),
        config.transcoding.max_attempts,
        config.initial_backoff(),
    ));

    let state = Arc::new(AppState {
        config,
        store,
        layout,
        bus,
        queue,
        gc,
        upload,
    });

    app::start_server(state, worker).await
}
