use super::layout::{StorageLayout, TEMP_PREFIX};
use crate::models::UploadStatus;
use crate::store::StateStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What one GC pass reclaimed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcReport {
    pub temp_files_removed: usize,
    pub session_dirs_removed: usize,
}

impl GcReport {
    pub fn total(&self) -> usize {
        self.temp_files_removed + self.session_dirs_removed
    }
}

/// StorageGc is the single writer of chunk-directory deletion.
///
/// Policies, applied to the chunks tree:
/// - `temp_*` files older than the temp TTL are deleted (aborted parses);
/// - a per-session directory is deleted once the session's declared expiry
///   has passed (sessions still in the Active set are never touched);
/// - a directory whose session is unknown is deleted once its mtime is
///   older than the orphan TTL (state lost across a restart).
///
/// Orphaned transcoded trees (video deleted mid-transcode) are reclaimed in
/// the same pass.
pub struct StorageGc {
    layout: StorageLayout,
    store: Arc<StateStore>,
    temp_ttl: Duration,
    orphan_ttl: Duration,
}

impl StorageGc {
    pub fn new(
        layout: StorageLayout,
        store: Arc<StateStore>,
        temp_ttl: Duration,
        orphan_ttl: Duration,
    ) -> Self {
        Self {
            layout,
            store,
            temp_ttl,
            orphan_ttl,
        }
    }

    /// Runs one full pass and reports what was reclaimed.
    pub async fn run(&self) -> GcReport {
        let mut report = GcReport::default();

        match fs::read_dir(self.layout.chunks_dir()).await {
            Ok(mut entries) => {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let path = entry.path();
                    let name = entry.file_name().to_string_lossy().into_owned();

                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|t| t.is_dir())
                        .unwrap_or(false);

                    if !is_dir && name.starts_with(TEMP_PREFIX) {
                        if self.older_than(&path, self.temp_ttl).await
                            && fs::remove_file(&path).await.is_ok()
                        {
                            debug!(file = %name, "GC removed stale temp file");
                            report.temp_files_removed += 1;
                        }
                        continue;
                    }

                    if is_dir && self.reclaim_session_dir(&path, &name).await {
                        report.session_dirs_removed += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "GC could not read chunks directory");
            }
        }

        self.reclaim_orphaned_transcodes().await;

        if report.total() > 0 {
            info!(
                temp_files = report.temp_files_removed,
                session_dirs = report.session_dirs_removed,
                "GC pass reclaimed storage"
            );
        }
        report
    }

    /// Decides whether one per-session chunk directory is reclaimable.
    async fn reclaim_session_dir(&self, path: &std::path::Path, name: &str) -> bool {
        match name.parse::<Uuid>().ok().and_then(|id| {
            self.store
                .get_session(id)
                .map(|session| (id, session))
        }) {
            Some((id, session)) => {
                // Sessions whose declared expiry has not passed stay in the
                // Active set and are never touched.
                if !session.is_expired() {
                    return false;
                }
                if fs::remove_dir_all(path).await.is_ok() {
                    self.store.set_session_status(id, UploadStatus::Expired);
                    info!(session_id = %id, "GC removed expired session chunks");
                    return true;
                }
                false
            }
            None => {
                // Unknown directory: reclaim only once it has sat idle.
                if self.older_than(path, self.orphan_ttl).await
                    && fs::remove_dir_all(path).await.is_ok()
                {
                    info!(dir = %name, "GC removed orphaned chunk directory");
                    return true;
                }
                false
            }
        }
    }

    /// Removes transcoded trees whose video record no longer exists.
    async fn reclaim_orphaned_transcodes(&self) {
        let Ok(mut entries) = fs::read_dir(self.layout.transcoded_dir()).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(video_id) = name.parse::<Uuid>() else {
                continue;
            };
            if self.store.get_video(video_id).is_none()
                && fs::remove_dir_all(entry.path()).await.is_ok()
            {
                info!(video_id = %video_id, "GC removed orphaned transcode output");
            }
        }
    }

    async fn older_than(&self, path: &std::path::Path, ttl: Duration) -> bool {
        let Ok(metadata) = fs::metadata(path).await else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > ttl)
            .unwrap_or(false)
    }

    /// Runs a pass immediately, then on every interval tick, until aborted.
    pub fn start(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.run().await;
            }
        })
    }
}
