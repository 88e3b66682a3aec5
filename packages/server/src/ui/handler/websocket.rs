//! WebSocket connection handlers.

use std::{sync::Arc, time::Duration};

use axum::{
    Extension,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    domain::{AuthContext, ConnectionHandle, IdentityLabel, RoomError, RoomName, Timestamp},
    infrastructure::dto::websocket::{ClientFrame, ServerFrame},
    ui::{error::ApiError, state::AppState},
    usecase::JoinRoomError,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Default, Deserialize)]
pub struct JoinQuery {
    pub room: Option<String>,
    /// Display label shown to other members
    pub label: Option<String>,
}

/// `GET /ws?room=<name>`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<JoinQuery>,
) -> Result<Response, ApiError> {
    upgrade(ws, state, auth, query.room, query.label).await
}

/// `GET /room/{name}`
pub async fn room_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
    Query(query): Query<JoinQuery>,
) -> Result<Response, ApiError> {
    upgrade(ws, state, auth, Some(name), query.label).await
}

async fn upgrade(
    ws: WebSocketUpgrade,
    state: Arc<AppState>,
    auth: AuthContext,
    room: Option<String>,
    label: Option<String>,
) -> Result<Response, ApiError> {
    // Rejections still answer over plain HTTP here
    let room = state
        .join_room_usecase
        .prepare(&auth, room.as_deref())
        .await?;
    let label = IdentityLabel::from_raw(label.as_deref());

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, auth, room, label)))
}

/// Forwards frames from the member channel to the socket and pings it every
/// `ping_interval`.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: SplitSink<WebSocket, Message>,
    ping_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    })
}

async fn reject(socket: &mut WebSocket, error: &str) {
    let frame = ServerFrame::Error {
        error: error.to_string(),
    };
    let _ = socket.send(Message::Text(frame.to_text().into())).await;
    let _ = socket.send(Message::Close(None)).await;
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    auth: AuthContext,
    room: RoomName,
    label: IdentityLabel,
) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = match state
        .join_room_usecase
        .execute(&auth, room.clone(), label, tx.clone())
        .await
    {
        Ok(handle) => handle,
        Err(JoinRoomError::Room(RoomError::RoomFull { capacity, .. })) => {
            tracing::warn!(room = %room, capacity, "Room is full, closing socket");
            reject(&mut socket, "room_full").await;
            return;
        }
        Err(e) => {
            tracing::error!(room = %room, "Failed to join room: {}", e);
            reject(&mut socket, "internal_error").await;
            return;
        }
    };
    tracing::info!(
        room = %handle.room,
        connection_id = %handle.connection_id,
        identity = %handle.identity,
        "Socket attached"
    );

    let (sender, mut receiver) = socket.split();
    let ping_interval = state.ping_interval;
    let idle_timeout = ping_interval * 2;

    let recv_state = state.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let msg = match tokio::time::timeout(idle_timeout, receiver.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::debug!(connection_id = %recv_handle.connection_id, "WebSocket error: {}", e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::info!(
                        connection_id = %recv_handle.connection_id,
                        "No traffic for {:?}, closing socket",
                        idle_timeout
                    );
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    relay_text(&recv_state, &recv_handle, &tx, text.as_str().to_owned()).await;
                }
                Message::Close(_) => break,
                // Pings are answered by the protocol layer; pongs only reset the idle timer
                _ => {}
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender, ping_interval);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    match state.leave_room_usecase.execute(&auth, &handle).await {
        Ok(true) => tracing::info!(
            room = %handle.room,
            connection_id = %handle.connection_id,
            "Socket detached"
        ),
        Ok(false) => {}
        Err(e) => tracing::warn!(room = %handle.room, "Failed to leave room: {}", e),
    }
}

async fn relay_text(
    state: &AppState,
    handle: &ConnectionHandle,
    tx: &mpsc::UnboundedSender<String>,
    text: String,
) {
    if ClientFrame::parse(&text) == ClientFrame::Ping {
        let pong = ServerFrame::Pong {
            ts: Timestamp::new(state.clock.now_millis()),
        };
        let _ = tx.send(pong.to_text());
        return;
    }
    if let Err(e) = state.relay_message_usecase.execute(handle, text).await {
        tracing::warn!(connection_id = %handle.connection_id, "Failed to relay message: {}", e);
    }
}
