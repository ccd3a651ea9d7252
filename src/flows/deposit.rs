//! Deposit creation.
//!
//! A deposit is chain first, amount second: the user picks one of the
//! supported networks from buttons, types an amount, and gets back whatever
//! the platform issued for it. That can be a hosted payment page, a bare
//! deposit address, or both; the address also goes out as a QR code so it
//! can be scanned straight from the chat.

use rust_decimal::Decimal;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::debug;

use crate::api::ApiClient;
use crate::bot::{keyboards, messaging};
use crate::config::{chain_by_id, MIN_DEPOSIT_UNITS};
use crate::flows::{guest_hint, report_api_error, stale_button};
use crate::session::{DepositFlow, Session};
use crate::validate;

/// Opens the deposit flow with the chain picker.
///
/// Only verification gates deposits; an empty or missing default wallet is
/// exactly what a deposit fixes.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn start_deposit(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    let fetched = match session.user.as_mut() {
        Some(user) => api.kyc_status(&mut user.tokens).await,
        None => return guest_hint(bot, chat).await,
    };

    match fetched {
        Ok(status) if !status.is_approved() => {
            let text = format!(
                "🪪 Verification must be approved before depositing. Current status: <b>{status}</b>."
            );
            messaging::send_html(bot, chat, &text).await
        }
        Ok(_) => {
            session.reset_flows();
            session.deposit_flow = Some(DepositFlow::default());
            messaging::send_html_with_markup(
                bot,
                chat,
                "📥 Pick the network to deposit on:",
                keyboards::chain_keyboard(),
            )
            .await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Chain button for a deposit.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn choose_chain(
    bot: &Bot,
    chat: ChatId,
    session: &mut Session,
    chain_id: u64,
) -> anyhow::Result<()> {
    let Some(flow) = session.deposit_flow.as_mut() else {
        return stale_button(bot, chat).await;
    };
    let Some(chain) = chain_by_id(chain_id) else {
        return messaging::send_html(bot, chat, "⚠️ That network is not supported.").await;
    };

    flow.chain_id = Some(chain.chain_id);
    let text = format!(
        "💵 How much would you like to deposit on <b>{}</b>? The minimum is {}.",
        chain.label, MIN_DEPOSIT_UNITS
    );
    messaging::send_html(bot, chat, &text).await
}

/// Text reply on the deposit amount step.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn handle_amount(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    text: &str,
) -> anyhow::Result<()> {
    let Some(chain_id) = session.deposit_flow.as_ref().and_then(|flow| flow.chain_id) else {
        return Ok(());
    };

    let Some(amount) = validate::parse_amount(text) else {
        return messaging::send_html(
            bot,
            chat,
            "⚠️ Send a positive number, like <code>100</code>.",
        )
        .await;
    };
    if amount < Decimal::from(MIN_DEPOSIT_UNITS) {
        let text = format!("⚠️ The minimum deposit is {MIN_DEPOSIT_UNITS}. Enter a larger amount.");
        return messaging::send_html(bot, chat, &text).await;
    }

    let created = match session.user.as_mut() {
        Some(user) => api.create_deposit(&mut user.tokens, amount, chain_id).await,
        None => return guest_hint(bot, chat).await,
    };

    match created {
        Ok(deposit) => {
            session.deposit_flow = None;

            let mut text = format!(
                "📥 <b>Deposit created</b>\nId: <code>{}</code>\nAmount: {}",
                html_escape::encode_text(&deposit.id),
                deposit.amount.unwrap_or(amount),
            );
            if let Some(network) = &deposit.network {
                text.push_str(&format!("\nNetwork: {}", html_escape::encode_text(network)));
            }
            if let Some(link) = &deposit.payment_link {
                text.push_str(&format!(
                    "\n\n<a href=\"{}\">Open the payment page</a>",
                    html_escape::encode_double_quoted_attribute(link)
                ));
            }
            messaging::send_html(bot, chat, &text).await?;

            if let Some(address) = &deposit.deposit_address {
                let text = format!(
                    "📬 Or send the funds directly to this address:\n<code>{}</code>",
                    html_escape::encode_text(address)
                );
                messaging::send_html(bot, chat, &text).await?;
                send_qr(bot, chat, address).await;
            }
            Ok(())
        }
        // The flow stays open so the user can try another amount
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Sends the address as a scannable QR code. Best effort; a chat that
/// already has the address in text loses nothing if this fails.
async fn send_qr(bot: &Bot, chat: ChatId, data: &str) {
    let raw = format!(
        "https://quickchart.io/qr?size=300&text={}",
        urlencoding::encode(data)
    );
    match url::Url::parse(&raw) {
        Ok(qr_url) => {
            if let Err(err) = bot.send_photo(chat, InputFile::url(qr_url)).await {
                debug!("QR code send failed: {err}");
            }
        }
        Err(err) => debug!("QR code URL construction failed: {err}"),
    }
}
