//! Common messaging utilities for the Telegram side.
//!
//! Everything the bot says goes out as HTML. Long texts are split under
//! Telegram's length cap before sending; short prompts can attach a
//! keyboard.

use crate::bot::resilient::send_message_resilient;
use crate::utils;
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode, ReplyMarkup};

/// Maximum message length for Telegram with safety margin.
/// Telegram's official limit is 4096, but we use 4000 to account for
/// HTML tags and other formatting that may be added.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

/// Sends an HTML message, splitting it into several messages when it
/// exceeds the Telegram limit.
///
/// # Errors
///
/// Returns an error if any part fails to send after retries.
pub async fn send_html(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    let parts = utils::split_long_message(text, TELEGRAM_MESSAGE_LIMIT);
    for part in parts {
        send_message_resilient(bot, chat_id, part, Some(ParseMode::Html)).await?;
    }
    Ok(())
}

/// Sends a short HTML message with a keyboard attached.
///
/// # Errors
///
/// Returns an error if the message fails to send after retries.
pub async fn send_html_with_markup(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    markup: impl Into<ReplyMarkup>,
) -> Result<()> {
    let markup = markup.into();
    let text = text.to_string();
    utils::retry_telegram_operation(|| async {
        bot.send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(markup.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await?;
    Ok(())
}
