//! Real-time push notifications.
//!
//! Every signed-in chat gets one websocket subscription to its
//! organization's private channel on the push provider. Deposit and
//! withdrawal events arriving there are reformatted and sent into the
//! chat. Subscriptions are keyed by `(chat, organization)` and arming is
//! idempotent per key, so repeated logins never stack a second socket.
//! Delivery runs on its own task and never blocks command handling.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::bot::messaging;
use crate::utils::short_hash;

/// The provider's wire protocol: frames, payloads, the subscription task.
pub mod pusher;

pub use pusher::TxEvent;

/// Failures that end a channel subscription.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The websocket could not be opened
    #[error("websocket connect failed: {0}")]
    Connect(String),
    /// The provider broke the expected frame exchange
    #[error("websocket protocol error: {0}")]
    Protocol(String),
    /// The platform refused to sign the channel subscription
    #[error("channel authorization failed: {0}")]
    Auth(#[from] ApiError),
}

/// Where formatted notifications go.
///
/// The production sink is Telegram; tests swap in their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifySink: Send + Sync {
    /// Delivers one HTML-formatted notification to a chat.
    async fn notify(&self, chat: ChatId, text: String) -> anyhow::Result<()>;
}

/// Sink that sends notifications as Telegram messages.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    /// Wraps a bot handle as a notification sink.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl NotifySink for TelegramSink {
    async fn notify(&self, chat: ChatId, text: String) -> anyhow::Result<()> {
        messaging::send_html(&self.bot, chat, &text).await
    }
}

/// Which side of the ledger an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Funds arrived
    Deposit,
    /// Funds left
    Withdrawal,
}

/// The private channel carrying one organization's events.
#[must_use]
pub fn channel_name(organization: &str) -> String {
    format!("private-org-{organization}")
}

/// One subscription per `(chat, organization)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BridgeKey {
    chat: ChatId,
    organization: String,
}

/// Manages channel subscriptions for signed-in chats.
pub struct NotifyBridge {
    api: Arc<ApiClient>,
    sink: Arc<dyn NotifySink>,
    /// `None` disables the bridge entirely (no provider configured)
    ws_url: Option<String>,
    subs: Arc<RwLock<HashMap<BridgeKey, CancellationToken>>>,
}

impl NotifyBridge {
    /// Creates a bridge. A `None` websocket URL disables it; arming then
    /// becomes a logged no-op.
    #[must_use]
    pub fn new(api: Arc<ApiClient>, sink: Arc<dyn NotifySink>, ws_url: Option<String>) -> Self {
        Self {
            api,
            sink,
            ws_url,
            subs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Opens a subscription for the chat, unless one is already live for
    /// the same `(chat, organization)` key. Returns whether a new
    /// subscription task was started.
    ///
    /// The key is claimed before the task spawns, so two arms racing each
    /// other still produce one subscription.
    pub async fn arm(&self, chat: ChatId, organization: &str, token: String) -> bool {
        let Some(ws_url) = self.ws_url.clone() else {
            debug!("Notification bridge disabled, not arming chat {chat}");
            return false;
        };

        let key = BridgeKey {
            chat,
            organization: organization.to_string(),
        };
        let cancel = CancellationToken::new();
        {
            let mut subs = self.subs.write().await;
            if subs.contains_key(&key) {
                return false;
            }
            subs.insert(key, cancel.clone());
        }

        let api = self.api.clone();
        let sink = self.sink.clone();
        let subs = self.subs.clone();
        let organization = organization.to_string();
        tokio::spawn(async move {
            let outcome = pusher::run_subscription(
                api,
                sink,
                ws_url,
                chat,
                organization.clone(),
                token,
                cancel.clone(),
            )
            .await;
            match outcome {
                Ok(()) => info!("Notification subscription for chat {chat} ended"),
                Err(err) => warn!("Notification subscription for chat {chat} failed: {err}"),
            }
            // On cancellation the entry is already gone; otherwise the dead
            // subscription must not shadow a future arm
            if !cancel.is_cancelled() {
                let key = BridgeKey { chat, organization };
                subs.write().await.remove(&key);
            }
        });
        true
    }

    /// Tears down the chat's subscription, if one is live.
    pub async fn disarm(&self, chat: ChatId, organization: &str) {
        let key = BridgeKey {
            chat,
            organization: organization.to_string(),
        };
        if let Some(cancel) = self.subs.write().await.remove(&key) {
            cancel.cancel();
            info!("Notification subscription for chat {chat} torn down");
        }
    }

    /// Tears down every live subscription. Used at shutdown.
    pub async fn disarm_all(&self) {
        let mut subs = self.subs.write().await;
        let count = subs.len();
        for (_, cancel) in subs.drain() {
            cancel.cancel();
        }
        if count > 0 {
            info!("Tore down {count} notification subscriptions");
        }
    }

    /// Number of live subscriptions.
    pub async fn active_count(&self) -> usize {
        self.subs.read().await.len()
    }
}

/// Renders one event as the chat message the user sees.
#[must_use]
pub fn format_event(kind: TxKind, event: &TxEvent) -> String {
    let (emoji, title) = match kind {
        TxKind::Deposit => ("💰", "Deposit received"),
        TxKind::Withdrawal => ("📤", "Withdrawal update"),
    };

    let mut text = format!("{emoji} <b>{title}</b>");
    if let Some(amount) = event.amount {
        text.push_str(&format!("\nAmount: <b>{amount}</b>"));
        if let Some(symbol) = &event.symbol {
            text.push_str(&format!(" {}", html_escape::encode_text(symbol)));
        }
    }
    if let Some(network) = &event.network {
        text.push_str(&format!(
            "\nNetwork: {}",
            html_escape::encode_text(network)
        ));
    }
    if let Some(status) = &event.status {
        text.push_str(&format!("\nStatus: {}", html_escape::encode_text(status)));
    }
    if let Some(hash) = &event.hash {
        text.push_str(&format!(
            "\nHash: <code>{}</code>",
            html_escape::encode_text(&short_hash(hash))
        ));
    }
    text
}

/// Formats and hands one event to the sink. Delivery failures are logged,
/// never propagated into the subscription loop.
pub(crate) async fn deliver(sink: &dyn NotifySink, chat: ChatId, kind: TxKind, event: &TxEvent) {
    let text = format_event(kind, event);
    if let Err(err) = sink.notify(chat, text).await {
        warn!("Notification delivery failed for chat {chat}: {err}");
    }
}
