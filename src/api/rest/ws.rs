use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::models::event::DeliveryEvent;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WatchQuery {
    /// Only forward events for this delivery.
    pub delivery_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WatchQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| watch_deliveries(socket, state, query))
}

async fn watch_deliveries(socket: WebSocket, state: Arc<AppState>, query: WatchQuery) {
    let (mut sink, mut incoming) = socket.split();
    let mut events = BroadcastStream::new(state.events_tx.subscribe());
    let filter = query.delivery_id;

    info!(delivery_id = filter.as_deref().unwrap_or("*"), "delivery watcher connected");

    let forward = tokio::spawn(async move {
        while let Some(next) = events.next().await {
            let frame = match next {
                Ok(event) if !wanted(&event, filter.as_deref()) => continue,
                Ok(event) => serde_json::to_string(&event),
                // Missed events: tell the client to re-fetch instead of
                // silently leaving a gap in its view.
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!(missed, "delivery watcher lagged");
                    serde_json::to_string(&json!({ "lagged": missed }))
                }
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "failed to encode delivery event");
                    continue;
                }
            };

            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let drain = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
            debug!("ignoring inbound websocket message");
        }
    });

    tokio::select! {
        _ = forward => {},
        _ = drain => {},
    }

    info!("delivery watcher disconnected");
}

fn wanted(event: &DeliveryEvent, delivery_id: Option<&str>) -> bool {
    delivery_id.is_none_or(|id| event.delivery_id == id)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::wanted;
    use crate::models::delivery::DeliveryStatus;
    use crate::models::event::DeliveryEvent;

    fn event(id: &str) -> DeliveryEvent {
        DeliveryEvent {
            delivery_id: id.to_string(),
            from: Some(DeliveryStatus::Pending),
            to: DeliveryStatus::Assigned,
            rider_id: Some("R1".to_string()),
            reason: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn filter_matches_single_delivery() {
        assert!(wanted(&event("D1"), None));
        assert!(wanted(&event("D1"), Some("D1")));
        assert!(!wanted(&event("D2"), Some("D1")));
    }
}
