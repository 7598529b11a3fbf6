//! Wire protocol: client events consumed and server events emitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::ids::{ConnectionId, GroupId, RoomId, UserId};

/// WebSocket client event. Tag names are the wire event names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinRoom { data: RoomPayload },
    JoinGroupRoom { data: JoinGroupRoomPayload },
    LeaveRoom { data: RoomPayload },
    SendMessage { data: SendMessagePayload },
    SendGroupMessage { data: SendGroupMessagePayload },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupRoomPayload {
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub receiver_id: UserId,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendGroupMessagePayload {
    pub group_id: GroupId,
    pub body: String,
}

/// Event sent over WebSocket to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerEvent {
    ConnectionEstablished { data: ConnectionEstablishedPayload },
    NewMessage { data: PrivateMessage },
    NewGroupMessage { data: GroupMessage },
    UserJoin { data: RoomUser },
    UserJoinGroup { data: RoomUser },
    UserOnline { data: PresenceChange },
    UserOffline { data: PresenceChange },
    Error { data: ErrorPayload },
    Pong,
}

impl ServerEvent {
    /// Serialize once; broadcast paths clone the resulting string per receiver.
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEstablishedPayload {
    pub connection_id: ConnectionId,
}

/// Confirmed private message. `id` and `timestamp` are assigned by the
/// message store; client-supplied values never appear on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub id: Uuid,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Confirmed group message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub id: Uuid,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// A user joined a room the receiver is subscribed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}
