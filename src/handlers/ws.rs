use crate::app::state::AppState;
use crate::events::VideoEvent;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientMessage {
    action: String,
    video_id: Uuid,
}

/// GET /ws — live client gateway.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One task per connected client. The client drives its subscription set
/// with `subscribe`/`unsubscribe` messages; every bus event goes out as a
/// `global-event`, and additionally as a `video-event` when the socket is
/// subscribed to that video. Reconnecting clients resubscribe themselves.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let mut events = state.bus.subscribe();
    let mut subscriptions: HashSet<Uuid> = HashSet::new();

    info!("Live client connected");

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &mut subscriptions);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Live client read error");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if forward_event(&mut sink, &subscriptions, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Slow consumer: drop rather than block the bus.
                        warn!(skipped = skipped, "Live client lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Live client disconnected");
}

fn handle_client_message(text: &str, subscriptions: &mut HashSet<Uuid>) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed client message");
            return;
        }
    };

    match message.action.as_str() {
        "subscribe" => {
            debug!(video_id = %message.video_id, "Client subscribed");
            subscriptions.insert(message.video_id);
        }
        "unsubscribe" => {
            debug!(video_id = %message.video_id, "Client unsubscribed");
            subscriptions.remove(&message.video_id);
        }
        other => {
            debug!(action = other, "Ignoring unknown client action");
        }
    }
}

async fn forward_event(
    sink: &mut (impl SinkExt<Message> + Unpin),
    subscriptions: &HashSet<Uuid>,
    event: &VideoEvent,
) -> Result<(), ()> {
    if subscriptions.contains(&event.video_id) {
        let frame = json!({ "type": "video-event", "event": event });
        sink.send(Message::Text(frame.to_string()))
            .await
            .map_err(|_| ())?;
    }

    let frame = json!({ "type": "global-event", "event": event });
    sink.send(Message::Text(frame.to_string()))
        .await
        .map_err(|_| ())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut subscriptions = HashSet::new();
        let video_id = Uuid::new_v4();

        let subscribe = format!(r#"{{"action":"subscribe","videoId":"{}"}}"#, video_id);
        handle_client_message(&subscribe, &mut subscriptions);
        assert!(subscriptions.contains(&video_id));

        let unsubscribe = format!(r#"{{"action":"unsubscribe","videoId":"{}"}}"#, video_id);
        handle_client_message(&unsubscribe, &mut subscriptions);
        assert!(subscriptions.is_empty());
    }

    #[test]
    fn test_malformed_messages_are_ignored() {
        let mut subscriptions = HashSet::new();
        handle_client_message("not json", &mut subscriptions);
        handle_client_message(r#"{"action":"subscribe"}"#, &mut subscriptions);
        handle_client_message(
            r#"{"action":"dance","videoId":"6a9f0b40-0000-0000-0000-000000000000"}"#,
            &mut subscriptions,
        );
        assert!(subscriptions.is_empty());
    }
}
