use std::sync::Arc;
use axum::{
    extract::{Query, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::models::{ClientMessage, ConnectedMessage, ErrorMessage, ServerMessage};
use crate::services::auth_service::{authenticated_user_id, get_auth_token};
use crate::websocket::msg_content_handler::handle_content_change;
use crate::websocket::msg_indicator_handler::handle_indicator_update;
use crate::websocket::msg_join_handler::{handle_join_document, handle_leave_document};
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::websocket::msg_task_handler::{handle_task_message, TaskEvent};
use crate::ws::connctx::ConnCtx;

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

/// WebSocket handler - authenticates, then upgrades the connection
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(query): Query<WebSocketQuery>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let user_id = get_auth_token(&headers, query.token.as_deref())
        .and_then(|token| authenticated_user_id(&token, app_state.config.cloud_auth_jwt_secret.as_deref()))
        .map_err(|e| {
            warn!("WebSocket auth failed: {}", e);
            e.status()
        })?;

    info!("New WebSocket connection attempt from user {}", user_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, app_state)))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: String, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Frames for this client are queued here by the broker and written out by one task
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn = Arc::new(ConnCtx::new(user_id.clone(), tx));
    let connection_id = conn.connection_id;
    app_state.broker.register(conn.clone()).await;

    conn.send(ServerMessage::Connected(ConnectedMessage {
        connection_id: connection_id.to_string(),
        user_id: user_id.clone(),
    }));

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize frame for connection {}: {}", connection_id, e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("WebSocket close frame received from connection {}", connection_id);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error on connection {}: {}", connection_id, e);
                break;
            }
        };

        // Parse the incoming message as JSON
        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(client_msg) => client_msg,
            Err(e) => {
                error!("Failed to parse message from connection {}: {}", connection_id, e);
                conn.send(ServerMessage::Error(ErrorMessage {
                    message: format!("Invalid message: {}", e),
                }));
                continue;
            }
        };
        debug!("Received message from connection {}: {:?}", connection_id, client_msg);

        match client_msg {
            ClientMessage::JoinDocument(msg) => handle_join_document(&msg, &conn, &app_state).await,
            ClientMessage::LeaveDocument(msg) => handle_leave_document(&msg, &conn, &app_state).await,
            ClientMessage::ContentChange(msg) => handle_content_change(msg, &conn, &app_state).await,
            ClientMessage::IndicatorUpdate(msg) => handle_indicator_update(msg, &conn, &app_state).await,
            ClientMessage::TaskCreated(msg) => handle_task_message(TaskEvent::Created, msg, &conn, &app_state).await,
            ClientMessage::TaskUpdated(msg) => handle_task_message(TaskEvent::Updated, msg, &conn, &app_state).await,
            ClientMessage::TaskDeleted(msg) => handle_task_message(TaskEvent::Deleted, msg, &conn, &app_state).await,
            ClientMessage::Ping => handle_ping_message(&conn),
        }
    }

    // Disconnect implies leave-all
    app_state.broker.remove_connection(connection_id).await;
    send_task.abort();
    info!("WebSocket connection {} terminated", connection_id);
}
