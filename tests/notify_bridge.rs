use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use payout_bot::api::ApiClient;
use payout_bot::notify::{NotifyBridge, NotifySink};
use serde_json::{json, Value};
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tokio::time::timeout;

const SOCKET_ID: &str = "81.4242";

/// Fake push provider plus the one platform route the bridge calls:
/// channel authorization. Each socket's subscribe frame is forwarded to
/// the test through `subscribe_tx`.
struct FakeProvider {
    subscribe_tx: mpsc::UnboundedSender<Value>,
}

/// Builds a provider frame; event payloads ride double-encoded as a
/// JSON string.
fn frame(event: &str, payload: &Value) -> String {
    json!({ "event": event, "data": payload.to_string() }).to_string()
}

async fn ws_handler(State(state): State<Arc<FakeProvider>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_provider_socket(socket, state))
}

async fn run_provider_socket(mut socket: WebSocket, state: Arc<FakeProvider>) {
    let hello = frame(
        "pusher:connection_established",
        &json!({ "socket_id": SOCKET_ID, "activity_timeout": 120 }),
    );
    if socket.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    let Some(Ok(Message::Text(subscribe))) = socket.recv().await else {
        return;
    };
    let Ok(subscribe) = serde_json::from_str::<Value>(&subscribe) else {
        return;
    };
    let _ = state.subscribe_tx.send(subscribe);

    let succeeded = frame("pusher_internal:subscription_succeeded", &json!({}));
    let _ = socket.send(Message::Text(succeeded.into())).await;

    let deposit = frame(
        "deposit",
        &json!({
            "amount": "250.50",
            "currency": "USDC",
            "network": "polygon",
            "txHash": "0x1234567890abcdef1234567890abcdef12345678",
            "status": "completed"
        }),
    );
    let _ = socket.send(Message::Text(deposit.into())).await;

    // Hold the socket open until the bridge hangs up or the test ends
    let _ = timeout(Duration::from_secs(10), socket.recv()).await;
}

/// Signs the channel subscription, folding the socket id into the
/// signature so the subscribe frame shows which socket got authorized.
async fn auth_handler(Json(body): Json<Value>) -> Json<Value> {
    let socket_id = body["socketId"].as_str().unwrap_or("missing");
    Json(json!({ "auth": format!("test-key:sig-{socket_id}") }))
}

async fn spawn_rig() -> (SocketAddr, mpsc::UnboundedReceiver<Value>) {
    let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
    let state = Arc::new(FakeProvider { subscribe_tx });
    let app = Router::new()
        .route("/app/{key}", get(ws_handler))
        .route("/api/notifications/auth", post(auth_handler))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, subscribe_rx)
}

/// Sink that forwards deliveries into the test instead of Telegram.
struct ChannelSink {
    tx: mpsc::UnboundedSender<(ChatId, String)>,
}

#[async_trait]
impl NotifySink for ChannelSink {
    async fn notify(&self, chat: ChatId, text: String) -> anyhow::Result<()> {
        let _ = self.tx.send((chat, text));
        Ok(())
    }
}

fn bridge_for(addr: SocketAddr, tx: mpsc::UnboundedSender<(ChatId, String)>) -> NotifyBridge {
    let api = Arc::new(ApiClient::new(
        format!("http://{addr}"),
        Duration::from_secs(5),
    ));
    NotifyBridge::new(
        api,
        Arc::new(ChannelSink { tx }),
        Some(format!("ws://{addr}/app/test-key?protocol=7")),
    )
}

#[tokio::test]
async fn deposit_event_reaches_the_chat_sink() {
    let (addr, mut subscribe_rx) = spawn_rig().await;
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
    let bridge = bridge_for(addr, sink_tx);

    assert!(bridge.arm(ChatId(42), "org-9", "login-token".to_string()).await);

    let subscribe = timeout(Duration::from_secs(5), subscribe_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscribe["event"], "pusher:subscribe");
    assert_eq!(subscribe["data"]["channel"], "private-org-org-9");
    assert_eq!(subscribe["data"]["auth"], format!("test-key:sig-{SOCKET_ID}"));

    let (chat, text) = timeout(Duration::from_secs(5), sink_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chat, ChatId(42));
    assert!(text.contains("Deposit received"));
    assert!(text.contains("250.5"));
    assert!(text.contains("USDC"));
}

#[tokio::test]
async fn second_arm_for_the_same_chat_is_a_noop() {
    let (addr, mut subscribe_rx) = spawn_rig().await;
    let (sink_tx, _sink_rx) = mpsc::unbounded_channel();
    let bridge = bridge_for(addr, sink_tx);

    assert!(bridge.arm(ChatId(7), "org-9", "login-token".to_string()).await);
    assert!(!bridge.arm(ChatId(7), "org-9", "login-token".to_string()).await);
    assert_eq!(bridge.active_count().await, 1);

    // Only the first arm opened a socket
    let first = timeout(Duration::from_secs(5), subscribe_rx.recv()).await;
    assert!(first.is_ok());
    let second = timeout(Duration::from_millis(300), subscribe_rx.recv()).await;
    assert!(second.is_err());

    bridge.disarm(ChatId(7), "org-9").await;
    assert_eq!(bridge.active_count().await, 0);
}

#[tokio::test]
async fn chats_in_different_organizations_subscribe_separately() {
    let (addr, mut subscribe_rx) = spawn_rig().await;
    let (sink_tx, _sink_rx) = mpsc::unbounded_channel();
    let bridge = bridge_for(addr, sink_tx);

    assert!(bridge.arm(ChatId(1), "org-a", "token-a".to_string()).await);
    assert!(bridge.arm(ChatId(2), "org-b", "token-b".to_string()).await);
    assert_eq!(bridge.active_count().await, 2);

    let mut channels = Vec::new();
    for _ in 0..2 {
        let subscribe = timeout(Duration::from_secs(5), subscribe_rx.recv())
            .await
            .unwrap()
            .unwrap();
        channels.push(subscribe["data"]["channel"].as_str().unwrap().to_string());
    }
    channels.sort();
    assert_eq!(channels, ["private-org-org-a", "private-org-org-b"]);

    bridge.disarm_all().await;
    assert_eq!(bridge.active_count().await, 0);
}
