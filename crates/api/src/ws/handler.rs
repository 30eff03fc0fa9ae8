use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use uplink_core::notification::{ClientMessage, NotificationMessage};
use uplink_core::types::UserId;

use crate::middleware::auth::WsAuthUser;
use crate::state::AppState;
use crate::ws::manager::{text_frame, WsManager};

/// HTTP handler that upgrades an authenticated request to WebSocket.
///
/// `WsAuthUser` runs before `WebSocketUpgrade`, so a missing or invalid
/// token is answered with 401 and the connection is never upgraded.
pub async fn ws_handler(
    WsAuthUser(user): WsAuthUser,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, user.user_id))
}

/// Manage a single WebSocket connection after upgrade.
///
///   1. Registers the connection for `user_id`.
///   2. Sends `connection_established` before anything else.
///   3. Spawns a sender task that forwards the connection's queue.
///   4. Processes inbound frames on the current task.
///   5. Cleans up on disconnect, eviction or a dead sink.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, user_id: UserId) {
    let (conn_id, mut rx) = ws_manager.register(user_id).await;
    tracing::info!(conn_id = %conn_id, user_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let greeting = match text_frame(&NotificationMessage::ConnectionEstablished { user_id }) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(conn_id = %conn_id, error = %e, "Failed to build greeting");
            ws_manager.unregister(&conn_id).await;
            return;
        }
    };
    if sink.send(greeting).await.is_err() {
        tracing::debug!(conn_id = %conn_id, "WebSocket closed before greeting");
        ws_manager.unregister(&conn_id).await;
        return;
    }

    // Sender task: forward queued messages to the WebSocket sink. Ends when
    // the queue is closed (unregistered) or the sink fails.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            inbound = stream.next() => {
                let Some(result) = inbound else { break };
                ws_manager.touch(&conn_id).await;
                match result {
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Text(text)) => {
                        handle_client_text(&ws_manager, &conn_id, text.as_str()).await;
                    }
                    Ok(Message::Pong(_)) => {
                        tracing::trace!(conn_id = %conn_id, "Pong received");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
            _ = &mut send_task => {
                tracing::debug!(conn_id = %conn_id, "Send path ended");
                break;
            }
        }
    }

    ws_manager.unregister(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, user_id, "WebSocket disconnected");
}

/// Answer an application-level client message.
async fn handle_client_text(ws_manager: &WsManager, conn_id: &str, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping { .. }) => {
            let reply = match text_frame(&NotificationMessage::pong()) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(conn_id = %conn_id, error = %e, "Failed to build pong");
                    return;
                }
            };
            if let Err(e) = ws_manager.send_to_connection(conn_id, reply).await {
                tracing::debug!(conn_id = %conn_id, error = %e, "Pong not queued");
            }
        }
        Err(e) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "Ignoring unrecognised client message");
        }
    }
}
