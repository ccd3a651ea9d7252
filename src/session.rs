//! Per-chat session state.
//!
//! Every chat owns one [`Session`]: who (if anyone) is signed in, which
//! conversation flow is in progress, and where the history view is paged
//! to. Handlers lock the session for their whole body, so all updates for
//! one chat are serialized while different chats proceed in parallel.

use crate::api::types::Profile;
use crate::config::HISTORY_PAGE_SIZE;
use crate::token::TokenStore;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::{Mutex, RwLock};

/// Signed-in account data attached to a chat.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Platform user id
    pub user_id: String,
    /// Sign-in email
    pub email: String,
    /// Organization the account belongs to
    pub organization_id: String,
    /// Display name, when the platform has one
    pub name: Option<String>,
    /// This session's access token
    pub tokens: TokenStore,
}

impl AuthUser {
    /// Builds the session user from a fetched profile and the token bundle
    /// issued at sign-in.
    #[must_use]
    pub fn from_profile(profile: Profile, tokens: TokenStore) -> Self {
        Self {
            user_id: profile.user_id,
            email: profile.email,
            organization_id: profile.organization_id,
            name: profile.name,
            tokens,
        }
    }
}

/// Step data for the login exchange.
///
/// The flow is waiting for an email until `sid` is set, and for the
/// one-time code afterwards.
#[derive(Debug, Default, Clone)]
pub struct AuthFlow {
    /// Email the code was requested for
    pub email: Option<String>,
    /// Server-issued code session id
    pub sid: Option<String>,
}

/// What kind of transfer a flow is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// To another platform user, by email
    Email,
    /// To an external wallet address
    Wallet,
    /// To the linked bank account
    Bank,
    /// Several email transfers pasted as one block
    Batch,
}

/// Step data for an in-progress transfer or withdrawal.
#[derive(Debug, Clone)]
pub struct TransferFlow {
    /// Transfer variant being driven
    pub kind: TransferKind,
    /// Chosen network, for wallet transfers
    pub network: Option<String>,
    /// Recipient email or address; bank withdrawals have none
    pub recipient: Option<String>,
    /// Amount entered by the user
    pub amount: Option<Decimal>,
    /// Parsed `email amount` pairs, for batch sends
    pub entries: Vec<(String, Decimal)>,
    /// Set once the summary is shown and only a button can proceed
    pub awaiting_confirm: bool,
}

impl TransferFlow {
    /// Starts an empty flow of the given kind.
    #[must_use]
    pub const fn new(kind: TransferKind) -> Self {
        Self {
            kind,
            network: None,
            recipient: None,
            amount: None,
            entries: Vec::new(),
            awaiting_confirm: false,
        }
    }
}

/// Step data for an in-progress deposit.
#[derive(Debug, Default, Clone)]
pub struct DepositFlow {
    /// Chosen chain; the flow waits for an amount once set
    pub chain_id: Option<u64>,
}

/// Paging cursor for the history view.
#[derive(Debug, Clone)]
pub struct HistoryPaging {
    /// Current page, 1-based
    pub page: u32,
    /// Page size requested from the API
    pub page_size: u32,
    /// Page count reported by the last fetch; bounds forward paging
    pub total_pages: u32,
}

impl Default for HistoryPaging {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: HISTORY_PAGE_SIZE,
            total_pages: 1,
        }
    }
}

/// Which free-text input the conversation is waiting for.
///
/// Text routing dispatches on this tag alone; no handler ever inspects
/// prompt wording to decide what a reply means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitKind {
    /// Email address for the login exchange
    LoginEmail,
    /// One-time code for the login exchange
    LoginOtp,
    /// Recipient email or wallet address for a transfer
    TransferRecipient,
    /// Amount for a transfer or withdrawal
    TransferAmount,
    /// Amount for a deposit
    DepositAmount,
}

/// Conversation state of one chat.
#[derive(Debug, Default)]
pub struct Session {
    /// Signed-in user, if any
    pub user: Option<AuthUser>,
    /// In-progress login exchange
    pub auth_flow: Option<AuthFlow>,
    /// In-progress transfer or withdrawal
    pub transfer_flow: Option<TransferFlow>,
    /// In-progress deposit
    pub deposit_flow: Option<DepositFlow>,
    /// History view cursor
    pub history: HistoryPaging,
    /// Addresses from the last wallet listing; copy-address buttons carry
    /// an index into this list, since an address itself does not fit in
    /// callback data
    pub wallet_addresses: Vec<String>,
}

impl Session {
    /// Whether a user is signed in on this chat.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Clears every in-progress flow. Starting a flow calls this first, so
    /// at most one flow is ever active.
    pub fn reset_flows(&mut self) {
        self.auth_flow = None;
        self.transfer_flow = None;
        self.deposit_flow = None;
    }

    /// The free-text input this chat is waiting for, if any.
    ///
    /// Returns `None` while a flow is waiting on a button press.
    #[must_use]
    pub fn awaiting_input(&self) -> Option<AwaitKind> {
        if let Some(auth) = &self.auth_flow {
            return Some(if auth.sid.is_some() {
                AwaitKind::LoginOtp
            } else {
                AwaitKind::LoginEmail
            });
        }

        if let Some(flow) = &self.transfer_flow {
            if flow.awaiting_confirm {
                return None;
            }
            match flow.kind {
                TransferKind::Email => {
                    if flow.recipient.is_none() {
                        return Some(AwaitKind::TransferRecipient);
                    }
                }
                TransferKind::Wallet => {
                    if flow.network.is_none() {
                        // Network is picked from buttons, not typed
                        return None;
                    }
                    if flow.recipient.is_none() {
                        return Some(AwaitKind::TransferRecipient);
                    }
                }
                TransferKind::Bank => {}
                TransferKind::Batch => {
                    // The whole block of lines arrives as one message
                    return if flow.entries.is_empty() {
                        Some(AwaitKind::TransferRecipient)
                    } else {
                        None
                    };
                }
            }
            if flow.amount.is_none() {
                return Some(AwaitKind::TransferAmount);
            }
            return None;
        }

        if let Some(deposit) = &self.deposit_flow {
            if deposit.chain_id.is_some() {
                return Some(AwaitKind::DepositAmount);
            }
        }

        None
    }
}

/// Registry of chat sessions.
///
/// Sessions are created on first touch and kept for the life of the
/// process; nothing is ever evicted.
pub struct SessionStore {
    sessions: RwLock<HashMap<ChatId, Arc<Mutex<Session>>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Gets the session for `chat`, creating an empty one on first touch.
    pub async fn get_or_create(&self, chat: ChatId) -> Arc<Mutex<Session>> {
        // Fast path: session already exists
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&chat) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(chat)
            .or_insert_with(|| Arc::new(Mutex::new(Session::default())))
            .clone()
    }

    /// Number of chats the bot has seen.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no chat has talked to the bot yet.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_awaiting_login_inputs() {
        let mut session = Session::default();
        assert_eq!(session.awaiting_input(), None);

        session.auth_flow = Some(AuthFlow::default());
        assert_eq!(session.awaiting_input(), Some(AwaitKind::LoginEmail));

        session.auth_flow = Some(AuthFlow {
            email: Some("me@example.com".to_string()),
            sid: Some("sid-1".to_string()),
        });
        assert_eq!(session.awaiting_input(), Some(AwaitKind::LoginOtp));
    }

    #[test]
    fn test_awaiting_transfer_inputs() {
        let mut session = Session::default();

        // Email transfer asks for the recipient first
        session.transfer_flow = Some(TransferFlow::new(TransferKind::Email));
        assert_eq!(session.awaiting_input(), Some(AwaitKind::TransferRecipient));

        // Wallet transfer waits for a network button before any text
        session.transfer_flow = Some(TransferFlow::new(TransferKind::Wallet));
        assert_eq!(session.awaiting_input(), None);

        let mut flow = TransferFlow::new(TransferKind::Wallet);
        flow.network = Some("polygon".to_string());
        session.transfer_flow = Some(flow);
        assert_eq!(session.awaiting_input(), Some(AwaitKind::TransferRecipient));

        // Bank withdrawals skip straight to the amount
        session.transfer_flow = Some(TransferFlow::new(TransferKind::Bank));
        assert_eq!(session.awaiting_input(), Some(AwaitKind::TransferAmount));

        // Batch sends take the whole block as one reply
        session.transfer_flow = Some(TransferFlow::new(TransferKind::Batch));
        assert_eq!(session.awaiting_input(), Some(AwaitKind::TransferRecipient));

        // Once the summary is out, only buttons can proceed
        let mut flow = TransferFlow::new(TransferKind::Bank);
        flow.amount = Some(Decimal::from(5));
        flow.awaiting_confirm = true;
        session.transfer_flow = Some(flow);
        assert_eq!(session.awaiting_input(), None);
    }

    #[test]
    fn test_awaiting_deposit_input() {
        let mut session = Session::default();

        session.deposit_flow = Some(DepositFlow::default());
        assert_eq!(session.awaiting_input(), None);

        session.deposit_flow = Some(DepositFlow {
            chain_id: Some(137),
        });
        assert_eq!(session.awaiting_input(), Some(AwaitKind::DepositAmount));
    }

    #[test]
    fn test_reset_flows_clears_everything() {
        let mut session = Session::default();
        session.auth_flow = Some(AuthFlow::default());
        session.transfer_flow = Some(TransferFlow::new(TransferKind::Email));
        session.deposit_flow = Some(DepositFlow::default());

        session.reset_flows();
        assert!(session.auth_flow.is_none());
        assert!(session.transfer_flow.is_none());
        assert!(session.deposit_flow.is_none());
        assert_eq!(session.awaiting_input(), None);
    }

    #[tokio::test]
    async fn test_store_returns_same_session_for_chat() {
        let store = SessionStore::new();
        assert!(store.is_empty().await);

        let a = store.get_or_create(ChatId(1)).await;
        let b = store.get_or_create(ChatId(1)).await;
        assert!(Arc::ptr_eq(&a, &b));

        let _ = store.get_or_create(ChatId(2)).await;
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_between_chats() {
        let store = SessionStore::new();
        {
            let session = store.get_or_create(ChatId(1)).await;
            session.lock().await.auth_flow = Some(AuthFlow::default());
        }
        let other = store.get_or_create(ChatId(2)).await;
        assert!(other.lock().await.auth_flow.is_none());
    }
}
