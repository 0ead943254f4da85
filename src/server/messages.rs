//! Streams broker messages to WebSocket clients.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use super::rest::ApiState;
use super::types::V1Message;
use crate::bus::Broker;

/// Upgrade to a WebSocket and forward every message of the app broker.
pub async fn messages_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    let broker = state.app.broker().clone();
    ws.on_upgrade(move |socket| forward(socket, broker))
}

async fn forward(socket: WebSocket, broker: Broker) {
    let mut sub = broker.subscribe("*");
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!(subscription = sub.id, "Messages client connected");

    loop {
        tokio::select! {
            m = sub.recv() => {
                let Some(m) = m else { break };
                let json = match serde_json::to_string(&V1Message::from(m)) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(json.into())).await.is_err() {
                    // The client has gone away.
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    broker.unsubscribe(sub.id);
    tracing::debug!(subscription = sub.id, "Messages client disconnected");
}
