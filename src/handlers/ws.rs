//! Delivery session: the per-connection WebSocket lifecycle.
//!
//! Authentication happens during the HTTP upgrade, so a socket only exists
//! for a resolved user. Each session processes its inbound events
//! sequentially; outbound delivery goes through an unbounded channel drained
//! by a forwarding task. On close, routing state is cleaned before the
//! registry deregisters, so an offline broadcast can never reach a room the
//! connection is still nominally joined to.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::handlers::http::AppState;
use crate::models::event::{
    ClientEvent, ConnectionEstablishedPayload, ErrorPayload, RoomUser, ServerEvent,
};
use crate::models::ids::{ConnectionId, RoomId, UserId};
use crate::registry::OutboundSender;

const BEARER_PREFIX: &str = "Bearer ";

/// Upgrade HTTP to WebSocket. The handshake token (query `token` or bearer
/// header) must resolve to a user before the upgrade; failure rejects with
/// 401 and no registry mutation.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = extract_token(&params, &headers)
        .ok_or_else(|| AppError::Auth("missing handshake token".to_string()))?;
    let user_id = state.jwt_secret().validate(&token)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, user_id)))
}

/// Token from `?token=` or `Authorization: Bearer …`.
pub(crate) fn extract_token(
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Option<String> {
    params.get("token").cloned().or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix(BEARER_PREFIX))
            .map(String::from)
    })
}

async fn handle_socket(state: AppState, socket: WebSocket, user_id: UserId) {
    let conn_id = ConnectionId::generate();
    info!(user_id = %user_id, conn_id = %conn_id, "ws connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let became_online = state
        .registry
        .register(user_id, conn_id.clone(), tx.clone())
        .await;
    if became_online {
        state.presence.user_online(user_id).await;
    }

    if let Ok(hello) = (ServerEvent::ConnectionEstablished {
        data: ConnectionEstablishedPayload {
            connection_id: conn_id.clone(),
        },
    })
    .to_json()
    {
        let _ = tx.send(hello);
    }

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if let Err(e) = handle_event(&state, user_id, &conn_id, &tx, &text).await {
                    // scoped to this connection; registries are untouched
                    debug!(conn_id = %conn_id, error = %e, "event failed");
                    send_error(&tx, &e);
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // routing state first, presence transition second
    state.router.leave_all(&conn_id).await;
    let became_offline = state.registry.deregister(user_id, &conn_id).await;
    if became_offline {
        state.presence.user_offline(user_id).await;
    }

    send_task.abort();
    info!(user_id = %user_id, conn_id = %conn_id, "ws disconnected");
}

async fn handle_event(
    state: &AppState,
    user_id: UserId,
    conn_id: &ConnectionId,
    tx: &OutboundSender,
    text: &str,
) -> AppResult<()> {
    let event: ClientEvent = serde_json::from_str(text)
        .map_err(|e| AppError::Protocol(format!("malformed event: {}", e)))?;

    match event {
        ClientEvent::JoinRoom { data } => {
            let room_id = RoomId::from(data.room_id);
            state.router.join(conn_id, room_id.clone()).await;
            notify_room_peers(
                state,
                conn_id,
                &room_id,
                ServerEvent::UserJoin {
                    data: RoomUser { user_id },
                },
            )
            .await;
            debug!(user_id = %user_id, conn_id = %conn_id, room_id = %room_id, "joined room");
        }
        ClientEvent::JoinGroupRoom { data } => {
            // the router does not authorize; membership is checked here
            if !state.groups.is_member(user_id, data.group_id).await? {
                return Err(AppError::Forbidden(
                    "not a member of this group".to_string(),
                ));
            }
            let room_id = RoomId::group(data.group_id);
            state.router.join(conn_id, room_id.clone()).await;
            notify_room_peers(
                state,
                conn_id,
                &room_id,
                ServerEvent::UserJoinGroup {
                    data: RoomUser { user_id },
                },
            )
            .await;
            debug!(user_id = %user_id, conn_id = %conn_id, room_id = %room_id, "joined group room");
        }
        ClientEvent::LeaveRoom { data } => {
            let room_id = RoomId::from(data.room_id);
            state.router.leave(conn_id, &room_id).await;
            debug!(conn_id = %conn_id, room_id = %room_id, "left room");
        }
        ClientEvent::SendMessage { data } => {
            state
                .fanout
                .send_private(user_id, data.receiver_id, &data.body)
                .await?;
        }
        ClientEvent::SendGroupMessage { data } => {
            state
                .fanout
                .send_group(user_id, data.group_id, &data.body)
                .await?;
        }
        ClientEvent::Ping => {
            if let Ok(pong) = ServerEvent::Pong.to_json() {
                let _ = tx.send(pong);
            }
        }
    }
    Ok(())
}

/// Tell a room's existing members that someone joined. The joining
/// connection itself is excluded.
async fn notify_room_peers(
    state: &AppState,
    conn_id: &ConnectionId,
    room_id: &RoomId,
    event: ServerEvent,
) {
    let peers: Vec<ConnectionId> = state
        .router
        .members_of(room_id)
        .await
        .into_iter()
        .filter(|c| c != conn_id)
        .collect();
    if peers.is_empty() {
        return;
    }
    match event.to_json() {
        Ok(payload) => state.registry.send_to_many(&peers, &payload).await,
        Err(e) => warn!(error = %e, "join event serialization failed"),
    }
}

/// Report a failure to the sender's own connection only.
fn send_error(tx: &OutboundSender, error: &AppError) {
    let event = ServerEvent::Error {
        data: ErrorPayload {
            kind: error.kind().to_string(),
            message: error.to_string(),
        },
    };
    match event.to_json() {
        Ok(payload) => {
            let _ = tx.send(payload);
        }
        Err(e) => warn!(error = %e, "error event serialization failed"),
    }
}
