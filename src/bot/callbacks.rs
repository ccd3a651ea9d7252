//! Inline button callback routing.
//!
//! Callback data is a short machine string, either an exact tag or a
//! `prefix:payload` pair. The spinner on the pressed button is answered
//! before any work starts, so a slow API call never leaves the client
//! stuck on "loading".

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::warn;

use crate::api::ApiClient;
use crate::bot::keyboards::{
    CB_CHAIN_PREFIX, CB_HISTORY_ITEM_PREFIX, CB_HISTORY_NEXT, CB_HISTORY_PREV, CB_HISTORY_REFRESH,
    CB_LOGIN_CANCEL, CB_LOGIN_NEW_OTP, CB_NETWORK_PREFIX, CB_SEND_BATCH, CB_SEND_EMAIL,
    CB_SEND_WALLET, CB_TRANSFER_CANCEL, CB_TRANSFER_CONFIRM, CB_WALLET_ADDR_PREFIX,
    CB_WALLET_DEFAULT_PREFIX, CB_WALLET_GENERATE, CB_WALLET_GEN_PREFIX,
};
use crate::flows;
use crate::session::SessionStore;

/// Handles one inline button press.
///
/// # Errors
///
/// Returns an error when Telegram rejects a reply.
pub async fn dispatch_callback(
    bot: Bot,
    q: CallbackQuery,
    api: Arc<ApiClient>,
    sessions: Arc<SessionStore>,
) -> anyhow::Result<()> {
    // Stop the button spinner no matter what happens below
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some((chat, message)) = q.message.as_ref().map(|msg| (msg.chat().id, msg.id())) else {
        return Ok(());
    };

    let session = sessions.get_or_create(chat).await;
    let mut session = session.lock().await;

    match data {
        CB_LOGIN_NEW_OTP => flows::auth::resend_otp(&bot, &api, chat, &mut session).await,
        CB_LOGIN_CANCEL => flows::auth::cancel_login(&bot, chat, &mut session).await,
        CB_SEND_EMAIL => flows::transfer::choose_email_kind(&bot, chat, &mut session).await,
        CB_SEND_WALLET => {
            flows::transfer::choose_wallet_kind(&bot, &api, chat, &mut session).await
        }
        CB_SEND_BATCH => flows::transfer::choose_batch_kind(&bot, chat, &mut session).await,
        CB_TRANSFER_CONFIRM => flows::transfer::confirm(&bot, &api, chat, &mut session).await,
        CB_TRANSFER_CANCEL => flows::transfer::cancel(&bot, chat, &mut session).await,
        CB_HISTORY_PREV => flows::history::prev(&bot, &api, chat, &mut session, message).await,
        CB_HISTORY_NEXT => flows::history::next(&bot, &api, chat, &mut session, message).await,
        CB_HISTORY_REFRESH => {
            flows::history::refresh(&bot, &api, chat, &mut session, message).await
        }
        CB_WALLET_GENERATE => flows::wallets::open_generate(&bot, chat, &mut session).await,
        other => {
            if let Some(network) = other.strip_prefix(CB_NETWORK_PREFIX) {
                flows::transfer::choose_network(&bot, chat, &mut session, network).await
            } else if let Some(raw) = other.strip_prefix(CB_CHAIN_PREFIX) {
                match raw.parse::<u64>() {
                    Ok(chain_id) => {
                        flows::deposit::choose_chain(&bot, chat, &mut session, chain_id).await
                    }
                    Err(_) => {
                        warn!("Malformed chain id in callback data: {other}");
                        Ok(())
                    }
                }
            } else if let Some(transfer_id) = other.strip_prefix(CB_HISTORY_ITEM_PREFIX) {
                flows::history::show_detail(&bot, &api, chat, &mut session, transfer_id).await
            } else if let Some(wallet_id) = other.strip_prefix(CB_WALLET_DEFAULT_PREFIX) {
                flows::wallets::make_default(&bot, &api, chat, &mut session, wallet_id).await
            } else if let Some(network) = other.strip_prefix(CB_WALLET_GEN_PREFIX) {
                flows::wallets::generate(&bot, &api, chat, &mut session, network).await
            } else if let Some(raw) = other.strip_prefix(CB_WALLET_ADDR_PREFIX) {
                match raw.parse::<usize>() {
                    Ok(index) => {
                        flows::wallets::copy_address(&bot, chat, &mut session, index).await
                    }
                    Err(_) => {
                        warn!("Malformed wallet index in callback data: {other}");
                        Ok(())
                    }
                }
            } else {
                warn!("Unknown callback data: {other}");
                Ok(())
            }
        }
    }
}
