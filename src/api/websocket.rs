//! WebSocket handler for live event streaming

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{
    api::state::ApiState,
    events::{EventKind, HubEvent},
};

/// WebSocket upgrade handler
///
/// GET /api/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

fn encode(event: &HubEvent) -> Option<Message> {
    serde_json::to_string(event).ok().map(Message::Text)
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();

    // Subscribe before building the snapshot so nothing falls in between
    let mut event_rx = state.events.subscribe();

    let initial = state.control.initial_data().await;
    let initial = match serde_json::to_value(&initial) {
        Ok(payload) => HubEvent::new(EventKind::InitialData, payload),
        Err(e) => {
            warn!("failed to serialize initial data: {e}");
            return;
        }
    };

    if let Some(message) = encode(&initial)
        && sender.send(message).await.is_err()
    {
        debug!("WebSocket send failed, client disconnected");
        return;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    if let Some(message) = encode(&event)
                        && sender.send(message).await.is_err()
                    {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => {
                    debug!("event channel closed");
                    break;
                }
            }
        }
    });

    // Incoming messages are only watched for close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket client disconnected");
}
