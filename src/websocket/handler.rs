//! WebSocket Handler
//!
//! Upgrades viewer connections and pumps their outbound queue into the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use super::messages::ViewerEvent;
use crate::api::AppState;

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established viewer connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = state.hub.channel();

    let viewer_id = match state.accept_viewer(tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected viewer connection");
            if let Some(text) = encode(&ViewerEvent::error(&e.to_string())) {
                let _ = sender.send(Message::Text(text)).await;
            }
            let _ = sender.close().await;
            return;
        }
    };

    let send_id = viewer_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Some(text) = encode(&event) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!(viewer_id = %send_id, "WebSocket send failed, closing connection");
                break;
            }
        }
    });

    let recv_id = viewer_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    tracing::debug!(viewer_id = %recv_id, text = %text, "Received viewer message");
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(viewer_id = %recv_id, "Viewer requested close");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(viewer_id = %recv_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(&viewer_id).await;
}

fn encode(event: &ViewerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, topic = %event.topic, "Failed to serialize frame");
            None
        }
    }
}
