//! Conversation flows.
//!
//! Each submodule drives one multi-step exchange: it owns the prompts,
//! the validation of replies and the API calls, while `bot` only routes
//! updates here. Flow steps mutate the chat [`Session`](crate::session::Session)
//! they are handed; the router holds the session lock for the whole update,
//! so steps never race each other within a chat.

use teloxide::prelude::*;

use crate::api::ApiError;
use crate::bot::{keyboards, messaging};
use crate::session::Session;

/// Login and logout, plus profile and verification status views.
pub mod auth;
/// Deposit creation with payment link and QR code.
pub mod deposit;
/// Paged transfer history with per-item detail.
pub mod history;
/// Transfers to users and wallets, bank withdrawals, batch sends.
pub mod transfer;
/// Wallet listing, balances, default selection and creation.
pub mod wallets;

/// Aborts whatever flow is in progress on this chat.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn cancel_active(bot: &Bot, chat: ChatId, session: &mut Session) -> anyhow::Result<()> {
    let had_flow = session.auth_flow.is_some()
        || session.transfer_flow.is_some()
        || session.deposit_flow.is_some();
    session.reset_flows();

    let text = if had_flow {
        "🚫 Cancelled."
    } else {
        "Nothing to cancel."
    };
    messaging::send_html_with_markup(
        bot,
        chat,
        text,
        keyboards::main_menu(session.is_authenticated()),
    )
    .await
}

/// Tells a signed-out chat to log in first.
pub(crate) async fn guest_hint(bot: &Bot, chat: ChatId) -> anyhow::Result<()> {
    messaging::send_html_with_markup(
        bot,
        chat,
        "🔑 You need to sign in first.",
        keyboards::main_menu(false),
    )
    .await
}

/// Reply for a button that no longer matches any in-progress flow.
pub(crate) async fn stale_button(bot: &Bot, chat: ChatId) -> anyhow::Result<()> {
    messaging::send_html(bot, chat, "♻️ That menu has expired. Start again from the menu.").await
}

/// Reports an API failure to the chat.
///
/// An unauthorized failure means the stored token is beyond saving, so the
/// chat is also signed out before the message goes out.
pub(crate) async fn report_api_error(
    bot: &Bot,
    chat: ChatId,
    session: &mut Session,
    err: &ApiError,
) -> anyhow::Result<()> {
    if matches!(err, ApiError::Unauthorized) && session.user.is_some() {
        session.user = None;
        session.reset_flows();
        return messaging::send_html_with_markup(
            bot,
            chat,
            &err.user_message(),
            keyboards::main_menu(false),
        )
        .await;
    }
    messaging::send_html(bot, chat, &err.user_message()).await
}
