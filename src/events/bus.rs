use super::types::VideoEvent;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the in-process fan-out channel. Slow subscribers that fall
/// further behind than this drop events rather than block emitters.
const LOCAL_CHANNEL_CAPACITY: usize = 256;

/// EventBus fans every emitted event out to two best-effort sinks: the
/// in-process broadcast channel consumed by the live client gateway, and an
/// optional Redis channel for cross-process listeners.
///
/// Local delivery is synchronous and preserves emission order per sender.
/// The broker sink is fire-and-forget; its failures are logged and swallowed
/// so a missing broker never blocks or fails emission.
pub struct EventBus {
    local: broadcast::Sender<VideoEvent>,
    broker: Option<ConnectionManager>,
    channel: String,
}

/// Opens a managed broker connection. Any failure logs and yields None so
/// the caller falls back to local mode.
pub async fn connect_broker(redis_url: &str) -> Option<ConnectionManager> {
    match redis::Client::open(redis_url) {
        Ok(client) => match ConnectionManager::new(client).await {
            Ok(manager) => {
                info!("Connected to broker");
                Some(manager)
            }
            Err(e) => {
                warn!(error = %e, "Broker unreachable, running in local mode");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "Invalid broker URL, running in local mode");
            None
        }
    }
}

impl EventBus {
    /// Creates a bus with no broker sink (local mode).
    pub fn local_only(channel: String) -> Self {
        let (local, _) = broadcast::channel(LOCAL_CHANNEL_CAPACITY);
        Self {
            local,
            broker: None,
            channel,
        }
    }

    /// Attaches the broker sink.
    pub fn with_broker(mut self, broker: Option<ConnectionManager>) -> Self {
        self.broker = broker;
        self
    }

    /// Whether the broker sink is attached.
    pub fn has_broker(&self) -> bool {
        self.broker.is_some()
    }

    /// Subscribes to the in-process stream.
    pub fn subscribe(&self) -> broadcast::Receiver<VideoEvent> {
        self.local.subscribe()
    }

    /// Emits one event to both sinks.
    pub fn emit(&self, event: VideoEvent) {
        debug!(
            event_type = %event.event_type,
            video_id = %event.video_id,
            "Emitting event"
        );

        // Local sink first: synchronous, in emission order. An Err here just
        // means nobody is subscribed.
        let _ = self.local.send(event.clone());

        if let Some(manager) = &self.broker {
            let mut connection = manager.clone();
            let channel = self.channel.clone();
            tokio::spawn(async move {
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize event for broker");
                        return;
                    }
                };
                if let Err(e) = connection.publish::<_, _, ()>(&channel, payload).await {
                    warn!(error = %e, channel = %channel, "Broker publish failed");
                }
            });
        }
    }
}
