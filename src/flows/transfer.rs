//! Transfers and withdrawals.
//!
//! Four variants run through here: email transfers to other platform users,
//! on-chain transfers to external wallets, withdrawals to the linked bank
//! account, and batch sends of several email transfers at once. Every
//! variant starts behind the same gate (approved verification, a default
//! wallet, money on it) and ends at an explicit confirm button.

use rust_decimal::Decimal;
use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::api::types::KycStatus;
use crate::api::{ApiClient, ApiError};
use crate::bot::{keyboards, messaging};
use crate::flows::{guest_hint, report_api_error, stale_button};
use crate::session::{AuthUser, Session, TransferFlow, TransferKind};
use crate::validate;

/// Why money movement is blocked for an otherwise signed-in chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferBlock {
    /// Verification is not approved yet
    KycNotApproved(KycStatus),
    /// No wallet is marked as the default to draw from
    NoDefaultWallet,
    /// The default wallet holds nothing
    EmptyBalance,
}

impl TransferBlock {
    /// The message telling the user what to fix.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::KycNotApproved(status) => format!(
                "🪪 Verification must be approved before moving funds. Current status: <b>{status}</b>."
            ),
            Self::NoDefaultWallet => {
                "👛 Pick a default wallet first (menu → Wallets).".to_string()
            }
            Self::EmptyBalance => {
                "💸 Your default wallet is empty. Top it up with a deposit first.".to_string()
            }
        }
    }
}

/// Checks the preconditions for moving money, in order. The first failing
/// one wins; `Ok(None)` means the flow may start.
async fn check_transfer_gate(
    api: &ApiClient,
    user: &mut AuthUser,
) -> Result<Option<TransferBlock>, ApiError> {
    let kyc = api.kyc_status(&mut user.tokens).await?;
    if !kyc.is_approved() {
        return Ok(Some(TransferBlock::KycNotApproved(kyc)));
    }

    let Some(wallet) = api.default_wallet(&mut user.tokens).await? else {
        return Ok(Some(TransferBlock::NoDefaultWallet));
    };
    if wallet.balance <= Decimal::ZERO {
        return Ok(Some(TransferBlock::EmptyBalance));
    }

    Ok(None)
}

/// Opens the send flow with the variant picker, gate permitting.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn start_send(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    let gate = match session.user.as_mut() {
        Some(user) => check_transfer_gate(api, user).await,
        None => return guest_hint(bot, chat).await,
    };

    match gate {
        Ok(None) => {
            session.reset_flows();
            messaging::send_html_with_markup(
                bot,
                chat,
                "💸 How would you like to send funds?",
                keyboards::transfer_kind_keyboard(),
            )
            .await
        }
        Ok(Some(block)) => messaging::send_html(bot, chat, &block.user_message()).await,
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Opens the withdrawal flow straight at the amount prompt, gate permitting.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn start_withdraw(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    let gate = match session.user.as_mut() {
        Some(user) => check_transfer_gate(api, user).await,
        None => return guest_hint(bot, chat).await,
    };

    match gate {
        Ok(None) => {
            session.reset_flows();
            session.transfer_flow = Some(TransferFlow::new(TransferKind::Bank));
            messaging::send_html(
                bot,
                chat,
                "🏦 How much would you like to withdraw to your linked bank account?",
            )
            .await
        }
        Ok(Some(block)) => messaging::send_html(bot, chat, &block.user_message()).await,
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Variant button: transfer by email.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn choose_email_kind(
    bot: &Bot,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    if session.user.is_none() {
        return guest_hint(bot, chat).await;
    }
    session.reset_flows();
    session.transfer_flow = Some(TransferFlow::new(TransferKind::Email));
    messaging::send_html(bot, chat, "📧 Send the recipient's email address.").await
}

/// Variant button: transfer to an external wallet. Offers the networks the
/// user actually holds wallets on.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn choose_wallet_kind(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    let fetched = match session.user.as_mut() {
        Some(user) => api.wallets(&mut user.tokens).await,
        None => return guest_hint(bot, chat).await,
    };

    match fetched {
        Ok(wallets) => {
            let mut networks: Vec<String> = Vec::new();
            for wallet in &wallets {
                if !networks.contains(&wallet.network) {
                    networks.push(wallet.network.clone());
                }
            }
            if networks.is_empty() {
                return messaging::send_html(
                    bot,
                    chat,
                    "👛 You have no wallets to send from yet. Create one under Wallets first.",
                )
                .await;
            }

            session.reset_flows();
            session.transfer_flow = Some(TransferFlow::new(TransferKind::Wallet));
            messaging::send_html_with_markup(
                bot,
                chat,
                "🔗 Pick the network to send on:",
                keyboards::network_keyboard(&networks),
            )
            .await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Variant button: several email transfers in one message.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn choose_batch_kind(
    bot: &Bot,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    if session.user.is_none() {
        return guest_hint(bot, chat).await;
    }
    session.reset_flows();
    session.transfer_flow = Some(TransferFlow::new(TransferKind::Batch));
    messaging::send_html(
        bot,
        chat,
        "📑 Send one line per transfer, like:\n<code>alice@example.com 25.50</code>\n<code>bob@example.com 10</code>",
    )
    .await
}

/// Network button for a wallet transfer.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn choose_network(
    bot: &Bot,
    chat: ChatId,
    session: &mut Session,
    network: &str,
) -> anyhow::Result<()> {
    let Some(flow) = session.transfer_flow.as_mut() else {
        return stale_button(bot, chat).await;
    };
    if flow.kind != TransferKind::Wallet {
        return stale_button(bot, chat).await;
    }

    flow.network = Some(network.to_string());
    messaging::send_html(
        bot,
        chat,
        "📬 Send the destination wallet address (<code>0x…</code>).",
    )
    .await
}

/// Text reply on the recipient step. Dispatches on the flow's variant, not
/// on what the last prompt said.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn handle_recipient(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    text: &str,
) -> anyhow::Result<()> {
    let Some(kind) = session.transfer_flow.as_ref().map(|flow| flow.kind) else {
        return Ok(());
    };

    match kind {
        TransferKind::Email => handle_email_recipient(bot, api, chat, session, text).await,
        TransferKind::Wallet => {
            let address = text.trim();
            if !validate::is_valid_wallet_address(address) {
                return messaging::send_html(
                    bot,
                    chat,
                    "⚠️ That does not look like a wallet address (<code>0x</code> plus 40 hex characters).",
                )
                .await;
            }
            if let Some(flow) = session.transfer_flow.as_mut() {
                flow.recipient = Some(address.to_string());
            }
            messaging::send_html(bot, chat, "💵 How much would you like to send?").await
        }
        TransferKind::Batch => handle_batch_block(bot, chat, session, text).await,
        // Bank withdrawals have no recipient step
        TransferKind::Bank => Ok(()),
    }
}

/// Email recipient step: validate, then check the recipient can actually
/// receive before asking for an amount.
async fn handle_email_recipient(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    text: &str,
) -> anyhow::Result<()> {
    let email = text.trim();
    if !validate::is_valid_email(email) {
        return messaging::send_html(
            bot,
            chat,
            "⚠️ That does not look like an email address. Try again.",
        )
        .await;
    }

    let eligible = match session.user.as_mut() {
        Some(user) => recipient_can_receive(api, user, email).await,
        None => return guest_hint(bot, chat).await,
    };
    if !eligible {
        // Recipient stays unset; the step repeats
        return messaging::send_html(
            bot,
            chat,
            "🚫 That recipient cannot receive transfers yet. They need a wallet and approved \
             verification on the platform. Try a different email.",
        )
        .await;
    }

    if let Some(flow) = session.transfer_flow.as_mut() {
        flow.recipient = Some(email.to_string());
    }
    messaging::send_html(bot, chat, "💵 How much would you like to send?").await
}

/// Batch step: parse the whole block, then go straight to confirmation.
async fn handle_batch_block(
    bot: &Bot,
    chat: ChatId,
    session: &mut Session,
    text: &str,
) -> anyhow::Result<()> {
    let entries = match parse_batch_lines(text) {
        Ok(entries) => entries,
        Err(problem) => {
            return messaging::send_html(bot, chat, &format!("⚠️ {problem}")).await;
        }
    };

    let total: Decimal = entries.iter().map(|(_, amount)| *amount).sum();
    let mut summary = String::from("📑 <b>Confirm batch</b>\n");
    for (email, amount) in &entries {
        summary.push_str(&format!(
            "• {} — <b>{amount}</b>\n",
            html_escape::encode_text(email)
        ));
    }
    summary.push_str(&format!(
        "\nTotal: <b>{total}</b> across {} transfers\n\nProceed?",
        entries.len()
    ));

    if let Some(flow) = session.transfer_flow.as_mut() {
        flow.entries = entries;
        flow.awaiting_confirm = true;
    }
    messaging::send_html_with_markup(bot, chat, &summary, keyboards::confirm_keyboard()).await
}

/// Text reply on the amount step. Quotes the fee when the platform offers
/// one, then shows the confirmation summary.
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
    let Some(amount) = validate::parse_amount(text) else {
        return messaging::send_html(
            bot,
            chat,
            "⚠️ Send a positive number, like <code>25.50</code>.",
        )
        .await;
    };
    if session.transfer_flow.is_none() {
        return Ok(());
    }

    // The quote is a courtesy; a missing one never blocks the transfer
    let fee_note = match session.user.as_mut() {
        Some(user) => match api.transfer_fee(&mut user.tokens, amount).await {
            Ok(fee) => {
                let mut note = format!("\nFee: {} {}", fee.fee, fee.currency);
                if let Some(total) = fee.total {
                    note.push_str(&format!("\nTotal: {total} {}", fee.currency));
                }
                note
            }
            Err(err) => {
                debug!("Fee quote unavailable: {err}");
                String::new()
            }
        },
        None => return guest_hint(bot, chat).await,
    };

    let Some(flow) = session.transfer_flow.as_mut() else {
        return Ok(());
    };
    flow.amount = Some(amount);
    flow.awaiting_confirm = true;

    let summary = match flow.kind {
        TransferKind::Email => format!(
            "📤 <b>Confirm transfer</b>\nTo: {}\nAmount: <b>{amount}</b>{fee_note}\n\nProceed?",
            html_escape::encode_text(flow.recipient.as_deref().unwrap_or("—")),
        ),
        TransferKind::Wallet => format!(
            "📤 <b>Confirm transfer</b>\nTo: <code>{}</code>\nNetwork: {}\nAmount: <b>{amount}</b>{fee_note}\n\nProceed?",
            html_escape::encode_text(flow.recipient.as_deref().unwrap_or("—")),
            html_escape::encode_text(flow.network.as_deref().unwrap_or("—")),
        ),
        TransferKind::Bank => format!(
            "🏦 <b>Confirm withdrawal</b>\nTo: your linked bank account\nAmount: <b>{amount}</b>{fee_note}\n\nProceed?"
        ),
        // Batch flows confirm from their own summary
        TransferKind::Batch => return Ok(()),
    };
    messaging::send_html_with_markup(bot, chat, &summary, keyboards::confirm_keyboard()).await
}

/// Confirm button: executes the summarized transfer.
///
/// The flow is taken out of the session before the API call, so a second
/// press of the same button finds nothing to execute.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn confirm(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    let Some(flow) = session.transfer_flow.take() else {
        return stale_button(bot, chat).await;
    };
    if !flow.awaiting_confirm {
        return stale_button(bot, chat).await;
    }

    if flow.kind == TransferKind::Batch {
        return confirm_batch(bot, api, chat, session, &flow.entries).await;
    }

    let Some(amount) = flow.amount else {
        return stale_button(bot, chat).await;
    };
    let Some(user) = session.user.as_mut() else {
        return guest_hint(bot, chat).await;
    };

    let result = match flow.kind {
        TransferKind::Email => {
            api.send_by_email(
                &mut user.tokens,
                flow.recipient.as_deref().unwrap_or_default(),
                amount,
            )
            .await
        }
        TransferKind::Wallet => {
            api.send_by_wallet(
                &mut user.tokens,
                flow.recipient.as_deref().unwrap_or_default(),
                flow.network.as_deref().unwrap_or_default(),
                amount,
            )
            .await
        }
        TransferKind::Bank => api.withdraw_to_bank(&mut user.tokens, amount).await,
        // Ruled out above; a confirm without a summary is a stale button.
        TransferKind::Batch => return stale_button(bot, chat).await,
    };

    match result {
        Ok(transfer) => {
            let title = if flow.kind == TransferKind::Bank {
                "Withdrawal submitted"
            } else {
                "Transfer submitted"
            };
            let text = format!(
                "✅ <b>{title}</b>\nId: <code>{}</code>\nStatus: {}\nAmount: {} {}",
                html_escape::encode_text(&transfer.id),
                html_escape::encode_text(&transfer.status),
                transfer.amount,
                html_escape::encode_text(&transfer.symbol),
            );
            messaging::send_html(bot, chat, &text).await
        }
        Err(err) if is_recipient_ineligible(&err) => {
            messaging::send_html(
                bot,
                chat,
                "🚫 The recipient is not eligible to receive this transfer.",
            )
            .await
        }
        Err(err) => {
            warn!("Transfer failed for chat {chat}: {err}");
            report_api_error(bot, chat, session, &err).await
        }
    }
}

async fn confirm_batch(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    entries: &[(String, Decimal)],
) -> anyhow::Result<()> {
    let Some(user) = session.user.as_mut() else {
        return guest_hint(bot, chat).await;
    };
    let result = api.send_batch(&mut user.tokens, entries).await;
    match result {
        Ok(transfers) => {
            let text = format!(
                "✅ <b>Batch submitted</b>\n{} transfers accepted.",
                transfers.len()
            );
            messaging::send_html(bot, chat, &text).await
        }
        Err(err) if is_recipient_ineligible(&err) => {
            messaging::send_html(
                bot,
                chat,
                "🚫 One of the recipients is not eligible to receive transfers.",
            )
            .await
        }
        Err(err) => {
            warn!("Batch send failed for chat {chat}: {err}");
            report_api_error(bot, chat, session, &err).await
        }
    }
}

/// Cancel button: forgets the summarized transfer.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn cancel(bot: &Bot, chat: ChatId, session: &mut Session) -> anyhow::Result<()> {
    session.transfer_flow = None;
    messaging::send_html_with_markup(
        bot,
        chat,
        "🚫 Transfer cancelled.",
        keyboards::main_menu(session.is_authenticated()),
    )
    .await
}

/// Whether an email recipient can receive transfers.
///
/// Tries the dedicated eligibility endpoint first, falls back to a user
/// lookup when the platform does not expose it, and assumes eligible when
/// neither gives an answer. The send itself is still validated server-side.
async fn recipient_can_receive(api: &ApiClient, user: &mut AuthUser, email: &str) -> bool {
    match api.recipient_eligibility(&mut user.tokens, email).await {
        Ok(verdict) => verdict,
        Err(ApiError::NotFound) => match api.lookup_user(&mut user.tokens, email).await {
            Ok(lookup) => lookup.has_wallets && lookup.kyc_approved,
            Err(err) => {
                warn!("Recipient lookup failed, assuming eligible: {err}");
                true
            }
        },
        Err(err) => {
            warn!("Eligibility check failed, assuming eligible: {err}");
            true
        }
    }
}

/// Parses `email amount` lines into batch entries. Blank lines are skipped;
/// the first malformed line aborts the whole block.
fn parse_batch_lines(text: &str) -> Result<Vec<(String, Decimal)>, String> {
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(email), Some(amount), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!(
                "Line {}: expected <code>email amount</code>.",
                idx + 1
            ));
        };
        if !validate::is_valid_email(email) {
            return Err(format!("Line {}: that is not an email address.", idx + 1));
        }
        let Some(amount) = validate::parse_amount(amount) else {
            return Err(format!("Line {}: that is not a positive amount.", idx + 1));
        };
        entries.push((email.to_string(), amount));
    }

    if entries.is_empty() {
        return Err("No transfers found. Send one line per transfer.".to_string());
    }
    Ok(entries)
}

/// Whether an API failure is the platform refusing the recipient.
fn is_recipient_ineligible(err: &ApiError) -> bool {
    let message = match err {
        ApiError::Validation(message) | ApiError::Api { message, .. } => message,
        _ => return false,
    };
    let lower = message.to_lowercase();
    lower.contains("eligib") || lower.contains("recipient cannot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_lines() {
        let entries = parse_batch_lines(
            "alice@example.com 25.50\n\n  bob@example.com 10  \ncarol@example.com 0.5",
        )
        .map_err(|problem| problem.to_string());
        let entries = entries.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "alice@example.com");
        assert_eq!(entries[1].1, Decimal::from(10));
    }

    #[test]
    fn test_parse_batch_lines_rejects_bad_input() {
        assert!(parse_batch_lines("").is_err());
        assert!(parse_batch_lines("alice@example.com").is_err());
        assert!(parse_batch_lines("alice@example.com ten").is_err());
        assert!(parse_batch_lines("not-an-email 10").is_err());
        assert!(parse_batch_lines("alice@example.com 10 extra").is_err());

        let problem = parse_batch_lines("alice@example.com 10\nbob@example.com -3");
        assert!(problem.is_err());
        assert!(problem.unwrap_err().starts_with("Line 2"));
    }

    #[test]
    fn test_recipient_ineligible_detection() {
        assert!(is_recipient_ineligible(&ApiError::Validation(
            "Recipient is not eligible for transfers".to_string()
        )));
        assert!(is_recipient_ineligible(&ApiError::Api {
            status: 400,
            message: "recipient cannot receive funds".to_string()
        }));
        assert!(!is_recipient_ineligible(&ApiError::Timeout));
        assert!(!is_recipient_ineligible(&ApiError::Validation(
            "amount too small".to_string()
        )));
    }

    #[test]
    fn test_transfer_block_messages_are_distinct() {
        let blocks = [
            TransferBlock::KycNotApproved(KycStatus::Pending),
            TransferBlock::NoDefaultWallet,
            TransferBlock::EmptyBalance,
        ];
        for (i, a) in blocks.iter().enumerate() {
            for b in blocks.iter().skip(i + 1) {
                assert_ne!(a.user_message(), b.user_message());
            }
        }
    }
}
