use crate::config::Config;
use crate::events::EventBus;
use crate::storage::{StorageGc, StorageLayout};
use crate::store::StateStore;
use crate::transcoding::JobQueue;
use crate::upload::UploadHandler;
use std::sync::Arc;

/// Shared application state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub store: Arc<StateStore>,
    pub layout: StorageLayout,
    pub bus: Arc<EventBus>,
    pub queue: Arc<JobQueue>,
    pub gc: Arc<StorageGc>,
    pub upload: UploadHandler,
}
