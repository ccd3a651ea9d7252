//! Telegram update routing.
//!
//! Three entry points, one per update shape: commands, button callbacks
//! and free text. Each locks the chat's session and hands off to the
//! matching [`flows`](crate::flows) step. Free text is routed by the
//! session's awaiting tag alone; the prompt wording never decides what a
//! reply means.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::api::ApiClient;
use crate::flows;
use crate::notify::NotifyBridge;
use crate::session::{AwaitKind, SessionStore};

/// Inline button callback routing.
pub mod callbacks;
/// The slash-command menu.
pub mod commands;
/// Reply and inline keyboard layouts.
pub mod keyboards;
/// High-level message sending.
pub mod messaging;
/// Retry wrappers over the Telegram API.
pub mod resilient;

use commands::Command;

/// Handles one slash command.
///
/// # Errors
///
/// Returns an error when Telegram rejects a reply.
pub async fn dispatch_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    api: Arc<ApiClient>,
    sessions: Arc<SessionStore>,
    bridge: Arc<NotifyBridge>,
) -> anyhow::Result<()> {
    let chat = msg.chat.id;
    let session = sessions.get_or_create(chat).await;
    let mut session = session.lock().await;

    match cmd {
        Command::Start => send_welcome(&bot, chat, session.is_authenticated()).await,
        Command::Help => send_help(&bot, chat).await,
        Command::Login => flows::auth::start_login(&bot, chat, &mut session).await,
        Command::Logout => flows::auth::logout(&bot, &bridge, chat, &mut session).await,
        Command::Profile => flows::auth::show_profile(&bot, &api, chat, &mut session).await,
        Command::Kyc => flows::auth::show_kyc(&bot, &api, chat, &mut session).await,
        Command::Wallets => flows::wallets::show_wallets(&bot, &api, chat, &mut session).await,
        Command::Balance => flows::wallets::show_balance(&bot, &api, chat, &mut session).await,
        Command::Send => flows::transfer::start_send(&bot, &api, chat, &mut session).await,
        Command::Withdraw => flows::transfer::start_withdraw(&bot, &api, chat, &mut session).await,
        Command::Deposit => flows::deposit::start_deposit(&bot, &api, chat, &mut session).await,
        Command::History => {
            session.history.page = 1;
            flows::history::show(&bot, &api, chat, &mut session, None).await
        }
        Command::Cancel => flows::cancel_active(&bot, chat, &mut session).await,
    }
}

/// Handles one free-text message: menu buttons first, then whatever input
/// the active flow is waiting for.
///
/// # Errors
///
/// Returns an error when Telegram rejects a reply.
pub async fn dispatch_text(
    bot: Bot,
    msg: Message,
    api: Arc<ApiClient>,
    sessions: Arc<SessionStore>,
    bridge: Arc<NotifyBridge>,
) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat = msg.chat.id;
    let session = sessions.get_or_create(chat).await;
    let mut session = session.lock().await;

    // Reply-keyboard buttons arrive as their plain labels
    match text {
        keyboards::BTN_LOGIN => return flows::auth::start_login(&bot, chat, &mut session).await,
        keyboards::BTN_HELP => return send_help(&bot, chat).await,
        keyboards::BTN_BALANCE => {
            return flows::wallets::show_balance(&bot, &api, chat, &mut session).await
        }
        keyboards::BTN_HISTORY => {
            session.history.page = 1;
            return flows::history::show(&bot, &api, chat, &mut session, None).await;
        }
        keyboards::BTN_SEND => {
            return flows::transfer::start_send(&bot, &api, chat, &mut session).await
        }
        keyboards::BTN_WITHDRAW => {
            return flows::transfer::start_withdraw(&bot, &api, chat, &mut session).await
        }
        keyboards::BTN_DEPOSIT => {
            return flows::deposit::start_deposit(&bot, &api, chat, &mut session).await
        }
        keyboards::BTN_WALLETS => {
            return flows::wallets::show_wallets(&bot, &api, chat, &mut session).await
        }
        keyboards::BTN_PROFILE => {
            return flows::auth::show_profile(&bot, &api, chat, &mut session).await
        }
        keyboards::BTN_LOGOUT => {
            return flows::auth::logout(&bot, &bridge, chat, &mut session).await
        }
        _ => {}
    }

    match session.awaiting_input() {
        Some(AwaitKind::LoginEmail) => {
            flows::auth::handle_email(&bot, &api, chat, &mut session, text).await
        }
        Some(AwaitKind::LoginOtp) => {
            flows::auth::handle_otp(&bot, &api, &bridge, chat, &mut session, text).await
        }
        Some(AwaitKind::TransferRecipient) => {
            flows::transfer::handle_recipient(&bot, &api, chat, &mut session, text).await
        }
        Some(AwaitKind::TransferAmount) => {
            flows::transfer::handle_amount(&bot, &api, chat, &mut session, text).await
        }
        Some(AwaitKind::DepositAmount) => {
            flows::deposit::handle_amount(&bot, &api, chat, &mut session, text).await
        }
        None => {
            messaging::send_html_with_markup(
                &bot,
                chat,
                "🤖 I did not catch that. Use the menu below or /help.",
                keyboards::main_menu(session.is_authenticated()),
            )
            .await
        }
    }
}

/// Greeting for /start.
async fn send_welcome(bot: &Bot, chat: ChatId, authenticated: bool) -> anyhow::Result<()> {
    let text = if authenticated {
        "👋 Welcome back."
    } else {
        "👋 Welcome to the payout assistant.\n\nI can send funds, create deposits and watch \
         your account for incoming payments. Sign in to get started."
    };
    messaging::send_html_with_markup(bot, chat, text, keyboards::main_menu(authenticated)).await
}

/// Command list for /help.
async fn send_help(bot: &Bot, chat: ChatId) -> anyhow::Result<()> {
    let text = format!(
        "ℹ️ <b>What I can do</b>\n\n{}",
        html_escape::encode_text(&Command::descriptions().to_string())
    );
    messaging::send_html(bot, chat, &text).await
}
