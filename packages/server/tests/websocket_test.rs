//! Integration tests for room sockets against a real listener.

mod common;

use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use consia_server::domain::{AuthContext, Identity, PlanTier};

use common::{DEVICE_SECRET, OWNER_SECRET, spawn_server, test_config};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

async fn connect(addr: SocketAddr, path: &str, secret: &str, label: &str) -> Socket {
    let separator = if path.contains('?') { '&' } else { '?' };
    let url = format!("ws://{addr}{path}{separator}token={secret}&label={label}");
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

/// Next JSON text frame, skipping control frames
async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(FRAME_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Assert that nothing but control frames arrives for a short while
async fn assert_silent(socket: &mut Socket) {
    let result = tokio::time::timeout(Duration::from_millis(200), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = result {
        panic!("unexpected frame: {text}");
    }
}

#[tokio::test]
async fn test_join_presence_and_relay_between_members() {
    // テスト項目: 2 人目の参加で presence が届き、中継されたメッセージは送信者以外に届く
    // given (前提条件):
    let (addr, _state) = spawn_server(test_config()).await;
    let mut alice = connect(addr, "/room/lobby", DEVICE_SECRET, "alice").await;
    let welcome = next_frame(&mut alice).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["room"], "lobby");
    assert_eq!(welcome["member_count"], 1);

    // when (操作):
    let mut bob = connect(addr, "/ws?room=lobby", OWNER_SECRET, "bob").await;
    let bob_welcome = next_frame(&mut bob).await;
    let joined = next_frame(&mut alice).await;
    bob.send(Message::Text(json!({ "text": "hi" }).to_string().into()))
        .await
        .unwrap();
    let relayed = next_frame(&mut alice).await;

    // then (期待する結果):
    assert_eq!(bob_welcome["type"], "welcome");
    assert_eq!(bob_welcome["member_count"], 2);
    assert_eq!(joined["type"], "presence");
    assert_eq!(joined["event"], "join");
    assert_eq!(joined["identity"], "bob");
    assert_eq!(joined["connection_id"], bob_welcome["connection_id"]);
    assert_eq!(relayed["type"], "message");
    assert_eq!(relayed["from"], bob_welcome["connection_id"]);
    assert_eq!(relayed["identity"], "bob");
    assert_eq!(relayed["data"], json!({ "text": "hi" }));
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_non_json_text_is_relayed_as_string() {
    // テスト項目: JSON でないテキストは JSON 文字列として中継される
    // given (前提条件):
    let (addr, _state) = spawn_server(test_config()).await;
    let mut alice = connect(addr, "/room/plain", DEVICE_SECRET, "alice").await;
    next_frame(&mut alice).await;
    let mut bob = connect(addr, "/room/plain", DEVICE_SECRET, "bob").await;
    next_frame(&mut bob).await;
    next_frame(&mut alice).await;

    // when (操作):
    bob.send(Message::Text("just words".into())).await.unwrap();

    // then (期待する結果):
    let relayed = next_frame(&mut alice).await;
    assert_eq!(relayed["data"], "just words");
}

#[tokio::test]
async fn test_ping_frame_is_answered_with_pong() {
    // テスト項目: {"type":"ping"} には送信者にだけ pong が返り、中継されない
    // given (前提条件):
    let (addr, _state) = spawn_server(test_config()).await;
    let mut alice = connect(addr, "/ws", DEVICE_SECRET, "alice").await;
    let welcome = next_frame(&mut alice).await;
    assert_eq!(welcome["room"], "global");
    let mut bob = connect(addr, "/ws", DEVICE_SECRET, "bob").await;
    next_frame(&mut bob).await;
    next_frame(&mut alice).await;

    // when (操作):
    bob.send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();

    // then (期待する結果):
    let pong = next_frame(&mut bob).await;
    assert_eq!(pong["type"], "pong");
    assert_eq!(pong["ts"], common::NOW_MILLIS);
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn test_close_emits_leave_and_updates_snapshot() {
    // テスト項目: 切断したメンバーの leave が残りのメンバーに届き、ルームのスナップショットから消える
    // given (前提条件):
    let (addr, state) = spawn_server(test_config()).await;
    let mut alice = connect(addr, "/room/exit", DEVICE_SECRET, "alice").await;
    next_frame(&mut alice).await;
    let mut bob = connect(addr, "/room/exit", DEVICE_SECRET, "bob").await;
    let bob_welcome = next_frame(&mut bob).await;
    next_frame(&mut alice).await;

    // when (操作):
    bob.close(None).await.unwrap();
    let left = next_frame(&mut alice).await;

    // then (期待する結果):
    assert_eq!(left["type"], "presence");
    assert_eq!(left["event"], "leave");
    assert_eq!(left["connection_id"], bob_welcome["connection_id"]);
    assert_eq!(left["member_count"], 1);
    let owner = AuthContext::new(Identity::Owner, PlanTier::Enterprise);
    let snapshot = state
        .get_room_detail_usecase
        .execute(&owner, "exit".to_string())
        .await
        .unwrap();
    assert_eq!(snapshot.member_count, 1);
}

#[tokio::test]
async fn test_full_room_sends_error_frame_and_closes() {
    // テスト項目: 定員に達したルームへの接続は room_full のエラーフレームの後に閉じられる
    // given (前提条件):
    let mut config = test_config();
    config.rooms.max_members = Some(1);
    let (addr, _state) = spawn_server(config).await;
    let mut alice = connect(addr, "/room/tiny", DEVICE_SECRET, "alice").await;
    next_frame(&mut alice).await;

    // when (操作):
    let mut bob = connect(addr, "/room/tiny", DEVICE_SECRET, "bob").await;
    let error = next_frame(&mut bob).await;

    // then (期待する結果):
    assert_eq!(error, json!({ "type": "error", "error": "room_full" }));
    let closed = tokio::time::timeout(FRAME_TIMEOUT, async {
        loop {
            match bob.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn test_unauthorized_upgrade_is_refused() {
    // テスト項目: 認証に失敗した接続はアップグレードされない
    // given (前提条件):
    let (addr, _state) = spawn_server(test_config()).await;

    // when (操作):
    let result = connect_async(format!("ws://{addr}/ws?token=wrong")).await;

    // then (期待する結果):
    assert!(result.is_err());
}

#[tokio::test]
async fn test_invalid_room_name_is_refused_before_upgrade() {
    // テスト項目: 不正なルーム名はアップグレード前に HTTP で拒否される
    // given (前提条件):
    let (addr, _state) = spawn_server(test_config()).await;
    let long_name = "x".repeat(100);

    // when (操作):
    let result = connect_async(format!(
        "ws://{addr}/room/{long_name}?token={DEVICE_SECRET}"
    ))
    .await;

    // then (期待する結果):
    assert!(result.is_err());
}
