//! Pusher wire protocol (version 7).
//!
//! The protocol is a thin JSON frame exchange: the server opens with
//! `pusher:connection_established` carrying our socket id, we authorize
//! that socket id for the private channel through the payout API and send
//! `pusher:subscribe`, and from then on the channel's events arrive as
//! frames whose `data` field is a JSON document encoded *as a string*.
//! Server pings must be answered or the connection is dropped.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use teloxide::types::ChatId;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{channel_name, deliver, BridgeError, NotifySink, TxKind};
use crate::api::types::decimal_from_value;
use crate::api::ApiClient;
use crate::token::TokenStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long the server gets to finish the opening exchange.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// One frame of the provider's protocol.
#[derive(Debug, Deserialize)]
pub(crate) struct PusherFrame {
    /// Event name, either `pusher:*`/`pusher_internal:*` or a channel event
    pub event: String,
    /// Raw payload; channel events double-encode this as a JSON string
    #[serde(default)]
    pub data: Option<Value>,
}

/// Decodes a frame's payload, unwrapping the string-encoded JSON the
/// protocol uses for channel events.
pub(crate) fn event_payload(frame: &PusherFrame) -> Option<Value> {
    match &frame.data {
        Some(Value::String(inner)) => serde_json::from_str(inner).ok(),
        Some(other) => Some(other.clone()),
        None => None,
    }
}

/// The subscribe frame for an authorized private channel.
pub(crate) fn subscribe_frame(channel: &str, auth: &str) -> String {
    json!({
        "event": "pusher:subscribe",
        "data": { "channel": channel, "auth": auth }
    })
    .to_string()
}

/// The reply a `pusher:ping` expects.
pub(crate) fn pong_frame() -> String {
    json!({ "event": "pusher:pong", "data": {} }).to_string()
}

/// Transaction payload of a deposit or withdrawal event, as sent by the
/// platform through the channel.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTxEvent {
    amount: Option<Value>,
    #[serde(alias = "currency")]
    symbol: Option<String>,
    network: Option<String>,
    #[serde(alias = "txHash")]
    hash: Option<String>,
    status: Option<String>,
}

/// Normalized transaction event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxEvent {
    /// Amount moved
    pub amount: Option<Decimal>,
    /// Currency symbol
    pub symbol: Option<String>,
    /// Network code
    pub network: Option<String>,
    /// Transaction hash
    pub hash: Option<String>,
    /// Lifecycle status
    pub status: Option<String>,
}

impl RawTxEvent {
    fn normalize(self) -> TxEvent {
        TxEvent {
            amount: self.amount.as_ref().and_then(decimal_from_value),
            symbol: self.symbol,
            network: self.network,
            hash: self.hash,
            status: self.status,
        }
    }
}

/// Parses a channel event payload leniently; unknown shapes come back
/// empty rather than failing the subscription.
pub(crate) fn parse_tx_event(payload: &Value) -> TxEvent {
    serde_json::from_value::<RawTxEvent>(payload.clone())
        .unwrap_or_default()
        .normalize()
}

/// Runs one channel subscription until the socket closes, the provider
/// errors, or the token is cancelled.
pub(crate) async fn run_subscription(
    api: Arc<ApiClient>,
    sink: Arc<dyn NotifySink>,
    ws_url: String,
    chat: ChatId,
    organization: String,
    token: String,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    let (mut stream, _) = connect_async(&ws_url)
        .await
        .map_err(|err| BridgeError::Connect(err.to_string()))?;

    let socket_id = timeout(HANDSHAKE_TIMEOUT, wait_for_socket_id(&mut stream))
        .await
        .map_err(|_| BridgeError::Protocol("handshake timed out".to_string()))??;

    let channel = channel_name(&organization);
    let mut tokens = TokenStore::new();
    tokens.set(token, None);
    let auth = api.channel_auth(&mut tokens, &socket_id, &channel).await?;

    stream
        .send(Message::Text(subscribe_frame(&channel, &auth).into()))
        .await
        .map_err(|err| BridgeError::Protocol(err.to_string()))?;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = stream.send(Message::Close(None)).await;
                return Ok(());
            }
            frame = stream.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                let message = frame.map_err(|err| BridgeError::Protocol(err.to_string()))?;
                match message {
                    Message::Text(text) => {
                        let Ok(frame) = serde_json::from_str::<PusherFrame>(text.as_str()) else {
                            debug!("Skipping unparseable frame on {channel}");
                            continue;
                        };
                        match frame.event.as_str() {
                            "pusher:ping" => {
                                stream
                                    .send(Message::Text(pong_frame().into()))
                                    .await
                                    .map_err(|err| BridgeError::Protocol(err.to_string()))?;
                            }
                            "pusher:error" => {
                                return Err(BridgeError::Protocol(error_detail(&frame)));
                            }
                            "pusher_internal:subscription_succeeded" => {
                                info!("Chat {chat} subscribed to {channel}");
                            }
                            name @ ("deposit" | "withdrawal") => {
                                let kind = if name == "deposit" {
                                    TxKind::Deposit
                                } else {
                                    TxKind::Withdrawal
                                };
                                let event = event_payload(&frame)
                                    .map(|payload| parse_tx_event(&payload))
                                    .unwrap_or_default();
                                deliver(sink.as_ref(), chat, kind, &event).await;

                                // Nudge the platform's balance cache; the
                                // user will ask for it next
                                if let Err(err) = api.wallets(&mut tokens).await {
                                    debug!("Balance refresh after event failed: {err}");
                                }
                            }
                            other => debug!("Ignoring event {other} on {channel}"),
                        }
                    }
                    Message::Ping(payload) => {
                        stream
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|err| BridgeError::Protocol(err.to_string()))?;
                    }
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

/// Waits out the opening exchange and returns our socket id.
async fn wait_for_socket_id(stream: &mut WsStream) -> Result<String, BridgeError> {
    while let Some(frame) = stream.next().await {
        let message = frame.map_err(|err| BridgeError::Protocol(err.to_string()))?;
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<PusherFrame>(text.as_str()) else {
            continue;
        };
        match frame.event.as_str() {
            "pusher:connection_established" => {
                return event_payload(&frame)
                    .and_then(|payload| {
                        payload
                            .get("socket_id")
                            .and_then(Value::as_str)
                            .map(str::to_owned)
                    })
                    .ok_or_else(|| {
                        BridgeError::Protocol(
                            "connection_established without socket_id".to_string(),
                        )
                    });
            }
            "pusher:error" => return Err(BridgeError::Protocol(error_detail(&frame))),
            _ => {}
        }
    }
    Err(BridgeError::Protocol(
        "socket closed during handshake".to_string(),
    ))
}

/// Human-readable detail of a `pusher:error` frame.
fn error_detail(frame: &PusherFrame) -> String {
    event_payload(frame)
        .and_then(|payload| {
            payload
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "unspecified provider error".to_string())
}
