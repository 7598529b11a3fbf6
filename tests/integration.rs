//! Integration tests: the HTTP surface via `tower::oneshot`, and the
//! end-to-end fan-out scenario driven against in-memory collaborator fakes
//! (no Postgres needed).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chatsock::auth::JwtSecret;
use chatsock::db::{GroupDirectory, MessageStore, StoredMessage, UserPresenceStore};
use chatsock::error::AppResult;
use chatsock::models::{ConnectionId, GroupId, RoomId, UserId};
use chatsock::{create_app, AppState, ConnectionRegistry, FanoutEngine, PresenceNotifier, RoomRouter};
use chrono::Utc;
use tokio::sync::mpsc;
use tower::util::ServiceExt;
use uuid::Uuid;

struct FakeMessageStore {
    persisted: AtomicUsize,
}

#[async_trait]
impl MessageStore for FakeMessageStore {
    async fn persist_private(
        &self,
        _sender_id: UserId,
        _receiver_id: UserId,
        _body: &str,
    ) -> AppResult<StoredMessage> {
        let n = self.persisted.fetch_add(1, Ordering::SeqCst);
        Ok(StoredMessage {
            id: Uuid::from_u128(n as u128 + 1),
            timestamp: Utc::now(),
        })
    }

    async fn persist_group(
        &self,
        _sender_id: UserId,
        _group_id: GroupId,
        _body: &str,
    ) -> AppResult<StoredMessage> {
        let n = self.persisted.fetch_add(1, Ordering::SeqCst);
        Ok(StoredMessage {
            id: Uuid::from_u128(n as u128 + 1),
            timestamp: Utc::now(),
        })
    }
}

struct FakeGroupDirectory;

#[async_trait]
impl GroupDirectory for FakeGroupDirectory {
    async fn is_member(&self, _user_id: UserId, _group_id: GroupId) -> AppResult<bool> {
        Ok(true)
    }
}

struct FakePresenceStore {
    writes: AtomicUsize,
}

#[async_trait]
impl UserPresenceStore for FakePresenceStore {
    async fn set_online(&self, _user_id: UserId, _online: bool) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct TestApp {
    state: AppState,
    presence_store: Arc<FakePresenceStore>,
}

fn test_app() -> TestApp {
    let registry = Arc::new(ConnectionRegistry::new());
    let router = Arc::new(RoomRouter::new());
    let messages = Arc::new(FakeMessageStore {
        persisted: AtomicUsize::new(0),
    });
    let groups = Arc::new(FakeGroupDirectory);
    let presence_store = Arc::new(FakePresenceStore {
        writes: AtomicUsize::new(0),
    });

    let fanout = FanoutEngine::new(
        registry.clone(),
        router.clone(),
        messages,
        groups.clone(),
        Duration::from_secs(5),
    );
    let presence = PresenceNotifier::new(registry.clone(), presence_store.clone());
    let jwt_secret = JwtSecret::new("test-jwt-secret-min-32-chars!!".to_string());

    TestApp {
        state: AppState {
            registry,
            router,
            fanout,
            presence,
            groups,
            jwt_secret,
        },
        presence_store,
    }
}

/// Serve the app on an ephemeral port; the ws upgrade path needs a real
/// connection (the upgrade extension is not available under `oneshot`).
async fn spawn_server(state: AppState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_app(state)).await.unwrap();
    });
    addr
}

/// Issue a raw ws upgrade request and return the HTTP status code.
async fn upgrade_status(addr: std::net::SocketAddr, token: Option<&str>) -> u16 {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let path = match token {
        Some(t) => format!("/ws?token={}", t),
        None => "/ws".to_string(),
    };
    let req = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        path, addr
    );
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(req.as_bytes()).await.unwrap();

    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    let head = String::from_utf8_lossy(&buf[..n]).to_string();
    // "HTTP/1.1 401 Unauthorized\r\n..."
    head.split_whitespace().nth(1).unwrap().parse().unwrap()
}

#[tokio::test]
async fn health_returns_ok_with_gauges() {
    let app = create_app(test_app().state);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 0);
    assert_eq!(json["online_users"], 0);
    assert_eq!(json["rooms"], 0);
}

#[tokio::test]
async fn ws_upgrade_without_token_is_rejected() {
    let addr = spawn_server(test_app().state).await;
    assert_eq!(upgrade_status(addr, None).await, 401);
}

#[tokio::test]
async fn ws_upgrade_with_bad_token_is_rejected() {
    let addr = spawn_server(test_app().state).await;
    assert_eq!(upgrade_status(addr, Some("garbage")).await, 401);
}

#[tokio::test]
async fn ws_upgrade_with_valid_token_switches_protocols() {
    let t = test_app();
    let token = t.state.jwt_secret.issue(UserId(Uuid::from_u128(1))).unwrap();
    let addr = spawn_server(t.state).await;
    assert_eq!(upgrade_status(addr, Some(&token)).await, 101);
}

/// Simulated connection: registered sender plus its receiving end.
async fn connect(
    state: &AppState,
    user: UserId,
) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
    let conn = ConnectionId::generate();
    let (tx, rx) = mpsc::unbounded_channel();
    let became_online = state.registry.register(user, conn.clone(), tx).await;
    if became_online {
        state.presence.user_online(user).await;
    }
    (conn, rx)
}

/// Simulated disconnect, in the session's cleanup order.
async fn disconnect(state: &AppState, user: UserId, conn: &ConnectionId) {
    state.router.leave_all(conn).await;
    let became_offline = state.registry.deregister(user, conn).await;
    if became_offline {
        state.presence.user_offline(user).await;
    }
}

fn events_of(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        out.push(serde_json::from_str(&payload).unwrap());
    }
    out
}

#[tokio::test]
async fn end_to_end_private_chat_scenario() {
    let t = test_app();
    let state = &t.state;
    let user_a = UserId(Uuid::from_u128(0xA));
    let user_b = UserId(Uuid::from_u128(0xB));
    let room = RoomId::private(user_a, user_b);

    // A connects with two sockets, B with one; all join the pair room
    let (c1, mut rx1) = connect(state, user_a).await;
    let (c2, mut rx2) = connect(state, user_a).await;
    let (c3, mut rx3) = connect(state, user_b).await;
    for c in [&c1, &c2, &c3] {
        state.router.join(c, room.clone()).await;
    }
    // drain connect-time presence traffic
    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        events_of(rx);
    }

    // A sends "hi": both of A's tabs echo, and B receives, all with the
    // same server-assigned id and timestamp
    let sent = state.fanout.send_private(user_a, user_b, "hi").await.unwrap();
    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let events = events_of(rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "new-message");
        assert_eq!(events[0]["data"]["id"], serde_json::json!(sent.id));
        assert_eq!(
            events[0]["data"]["timestamp"],
            serde_json::json!(sent.timestamp)
        );
    }

    // B disconnects: exactly one user-offline reaches A's connections
    disconnect(state, user_b, &c3).await;
    for rx in [&mut rx1, &mut rx2] {
        let offline: Vec<_> = events_of(rx)
            .into_iter()
            .filter(|e| e["event"] == "user-offline")
            .collect();
        assert_eq!(offline.len(), 1);
        assert_eq!(
            offline[0]["data"]["userId"],
            serde_json::json!(user_b)
        );
    }
    assert!(!state.registry.is_online(user_b).await);
    assert!(state.router.members_of(&room).await.len() == 2);

    // A's later send still persists and reaches only the remaining tabs
    state.fanout.send_private(user_a, user_b, "still there?").await.unwrap();
    for rx in [&mut rx1, &mut rx2] {
        let events = events_of(rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["data"]["body"], "still there?");
    }

    // presence store saw both the online and the offline flags
    assert!(t.presence_store.writes.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn multi_tab_disconnect_fires_no_offline_until_last() {
    let t = test_app();
    let state = &t.state;
    let user_a = UserId(Uuid::from_u128(0xA));
    let observer = UserId(Uuid::from_u128(0xE));

    let (_oc, mut orx) = connect(state, observer).await;
    let (c1, _rx1) = connect(state, user_a).await;
    let (c2, _rx2) = connect(state, user_a).await;
    events_of(&mut orx);

    disconnect(state, user_a, &c1).await;
    assert!(events_of(&mut orx)
        .iter()
        .all(|e| e["event"] != "user-offline"));

    disconnect(state, user_a, &c2).await;
    let offline: Vec<_> = events_of(&mut orx)
        .into_iter()
        .filter(|e| e["event"] == "user-offline")
        .collect();
    assert_eq!(offline.len(), 1);
}
