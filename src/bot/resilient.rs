//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! This module provides wrappers around Telegram API operations that automatically
//! retry on transient network failures using exponential backoff with jitter.
//!
//! # Usage
//!
//! ```ignore
//! use payout_bot::bot::resilient::{send_message_resilient, edit_message_safe_resilient};
//!
//! // Send with automatic retry
//! let msg = send_message_resilient(&bot, chat_id, "Hello!", Some(ParseMode::Html)).await?;
//!
//! // Edit with graceful degradation
//! let success = edit_message_safe_resilient(&bot, chat_id, msg.id, "Updated!", None).await;
//! ```

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, Message, MessageId, ParseMode};
use tracing::{debug, warn};

/// Send a message with automatic retry on network failures.
///
/// Uses [`crate::utils::retry_telegram_operation`] with exponential backoff
/// to handle transient network errors.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot
            .edit_message_text(chat_id, msg_id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(kb) = markup.clone() {
            req = req.reply_markup(kb);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
    })
    .await
}

/// Edit a message with graceful degradation and automatic retry.
///
/// Retries transient failures, and swallows the two expected edit errors
/// ("message is not modified", "message to edit not found") so callbacks
/// that re-render an unchanged view stay quiet.
///
/// Returns `true` if the message was actually edited.
pub async fn edit_message_safe_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> bool {
    const ERROR_NOT_MODIFIED: &str = "message is not modified";
    const ERROR_NOT_FOUND: &str = "message to edit not found";

    // Truncate if too long (Telegram limit is 4096, we use 4000 for safety)
    let truncated = if text.chars().count() > 4000 {
        let truncated_text = crate::utils::truncate_str(text, 4000);
        format!("{truncated_text}…")
    } else {
        text.to_string()
    };

    match edit_message_resilient(bot, chat_id, msg_id, truncated, markup).await {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains(ERROR_NOT_MODIFIED) || err_msg.contains(ERROR_NOT_FOUND) {
                debug!("Message update skipped: {err_msg}");
            } else {
                warn!("Failed to edit message after retries: {e}");
            }
            false
        }
    }
}
