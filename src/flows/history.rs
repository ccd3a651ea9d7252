//! Paged transfer history.
//!
//! One message carries the whole view: a page of transfers as text, one
//! button per transfer for details, and a prev/refresh/next row. Paging
//! edits that message in place instead of flooding the chat. The cursor
//! lives in the session and is clamped against the page count the server
//! reported last, so the arrows never request a page that cannot exist.

use teloxide::prelude::*;
use teloxide::types::MessageId;

use crate::api::types::Transfer;
use crate::api::{ApiClient, ApiError};
use crate::bot::{keyboards, messaging, resilient};
use crate::flows::{guest_hint, report_api_error};
use crate::session::Session;
use crate::utils::{short_hash, truncate_str};

/// Renders the current history page, either as a fresh message or into
/// the existing view.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn show(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    edit: Option<MessageId>,
) -> anyhow::Result<()> {
    let (page, size) = (session.history.page, session.history.page_size);
    let fetched = match session.user.as_mut() {
        Some(user) => api.transfers(&mut user.tokens, page, size).await,
        None => return guest_hint(bot, chat).await,
    };

    let fetched = match fetched {
        Ok(fetched) => fetched,
        Err(err) => return report_api_error(bot, chat, session, &err).await,
    };

    session.history.total_pages = fetched.total_pages;
    if session.history.page > fetched.total_pages {
        // History shrank under us; snap back to the last real page
        session.history.page = fetched.total_pages;
    }

    if fetched.items.is_empty() && fetched.page <= 1 {
        return messaging::send_html(bot, chat, "📜 You have no transfers yet.").await;
    }

    let text = render_page(&fetched.items, fetched.page, fetched.total_pages);
    let items: Vec<(String, String)> = fetched
        .items
        .iter()
        .map(|transfer| (item_label(transfer), transfer.id.clone()))
        .collect();
    let markup = keyboards::history_keyboard(fetched.page, fetched.total_pages, &items);

    match edit {
        Some(msg_id) => {
            resilient::edit_message_safe_resilient(bot, chat, msg_id, &text, Some(markup)).await;
            Ok(())
        }
        None => messaging::send_html_with_markup(bot, chat, &text, markup).await,
    }
}

/// Arrow button: one page forward. A press on the last page is a no-op.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn next(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    message: MessageId,
) -> anyhow::Result<()> {
    if session.history.page >= session.history.total_pages {
        return Ok(());
    }
    session.history.page += 1;
    show(bot, api, chat, session, Some(message)).await
}

/// Arrow button: one page back. A press on the first page is a no-op.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn prev(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    message: MessageId,
) -> anyhow::Result<()> {
    if session.history.page <= 1 {
        return Ok(());
    }
    session.history.page -= 1;
    show(bot, api, chat, session, Some(message)).await
}

/// Middle button: refetches the current page in place.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn refresh(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    message: MessageId,
) -> anyhow::Result<()> {
    show(bot, api, chat, session, Some(message)).await
}

/// Item button: full detail of one transfer, as a fresh message so the
/// list stays where it is.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn show_detail(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    transfer_id: &str,
) -> anyhow::Result<()> {
    let fetched = match session.user.as_mut() {
        Some(user) => api.transfer(&mut user.tokens, transfer_id).await,
        None => return guest_hint(bot, chat).await,
    };

    match fetched {
        Ok(transfer) => {
            let mut text = format!(
                "🧾 <b>Transfer {}</b>\nStatus: {} {}\nAmount: {} {}",
                html_escape::encode_text(&short_hash(&transfer.id)),
                status_emoji(&transfer.status),
                html_escape::encode_text(&transfer.status),
                transfer.amount,
                html_escape::encode_text(&transfer.symbol),
            );
            if let Some(recipient) = &transfer.recipient {
                text.push_str(&format!("\nTo: {}", html_escape::encode_text(recipient)));
            }
            if let Some(network) = &transfer.network {
                text.push_str(&format!("\nNetwork: {}", html_escape::encode_text(network)));
            }
            if let Some(hash) = &transfer.tx_hash {
                text.push_str(&format!(
                    "\nHash: <code>{}</code>",
                    html_escape::encode_text(hash)
                ));
            }
            if let Some(created) = transfer.created_at {
                text.push_str(&format!("\nCreated: {}", created.format("%Y-%m-%d %H:%M UTC")));
            }
            messaging::send_html(bot, chat, &text).await
        }
        Err(ApiError::NotFound) => {
            messaging::send_html(bot, chat, "🔍 That transfer no longer exists.").await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// One page of transfers as HTML lines.
fn render_page(items: &[Transfer], page: u32, total_pages: u32) -> String {
    let mut text = format!("📜 <b>Transfer history</b> (page {page}/{total_pages})\n");
    for transfer in items {
        text.push_str(&format!(
            "\n{} <b>{}</b> {}",
            status_emoji(&transfer.status),
            transfer.amount,
            html_escape::encode_text(&transfer.symbol),
        ));
        if let Some(recipient) = &transfer.recipient {
            text.push_str(&format!(
                " → {}",
                html_escape::encode_text(&truncate_str(recipient, 30))
            ));
        }
        if let Some(created) = transfer.created_at {
            text.push_str(&format!("\n   {}", created.format("%Y-%m-%d %H:%M")));
        }
        text.push('\n');
    }
    text
}

/// Compact label for a transfer's detail button.
fn item_label(transfer: &Transfer) -> String {
    let mut label = format!("{} {}", transfer.amount, transfer.symbol);
    if let Some(recipient) = &transfer.recipient {
        label.push_str(&format!(" → {}", truncate_str(recipient, 24)));
    }
    truncate_str(label, 56)
}

/// Status marker shown next to each transfer.
fn status_emoji(status: &str) -> &'static str {
    let lower = status.to_lowercase();
    if lower.contains("complet") || lower.contains("success") || lower.contains("confirm") {
        "✅"
    } else if lower.contains("pend") || lower.contains("process") || lower.contains("queue") {
        "⏳"
    } else if lower.contains("fail") || lower.contains("reject") || lower.contains("cancel") || lower.contains("error") {
        "❌"
    } else {
        "▫️"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn transfer(status: &str) -> Transfer {
        Transfer {
            id: "tr_1".to_string(),
            amount: Decimal::new(2550, 2),
            symbol: "USDC".to_string(),
            status: status.to_string(),
            recipient: Some("alice@example.com".to_string()),
            network: None,
            tx_hash: None,
            created_at: None,
        }
    }

    #[test]
    fn test_status_emoji() {
        assert_eq!(status_emoji("COMPLETED"), "✅");
        assert_eq!(status_emoji("pending"), "⏳");
        assert_eq!(status_emoji("Failed"), "❌");
        assert_eq!(status_emoji("weird"), "▫️");
    }

    #[test]
    fn test_render_page_mentions_every_item() {
        let items = vec![transfer("completed"), transfer("pending")];
        let text = render_page(&items, 2, 7);
        assert!(text.contains("page 2/7"));
        assert_eq!(text.matches("25.50").count(), 2);
        assert!(text.contains("alice@example.com"));
    }

    #[test]
    fn test_item_label_fits_telegram_button() {
        let mut long = transfer("completed");
        long.recipient = Some("a-very-long-recipient-address@example-domain.com".to_string());
        assert!(item_label(&long).chars().count() <= 56);
    }

    // The clamped arrows return before touching the network, so these run
    // against a client pointed at nothing.

    #[tokio::test]
    async fn test_prev_on_first_page_is_noop() {
        let bot = Bot::new("123:TEST");
        let api = ApiClient::new("http://127.0.0.1:1", Duration::from_secs(1));
        let mut session = Session::default();
        session.history.total_pages = 3;

        prev(&bot, &api, ChatId(1), &mut session, MessageId(1))
            .await
            .unwrap();
        assert_eq!(session.history.page, 1);
    }

    #[tokio::test]
    async fn test_next_past_last_page_is_noop() {
        let bot = Bot::new("123:TEST");
        let api = ApiClient::new("http://127.0.0.1:1", Duration::from_secs(1));
        let mut session = Session::default();
        session.history.page = 3;
        session.history.total_pages = 3;

        next(&bot, &api, ChatId(1), &mut session, MessageId(1))
            .await
            .unwrap();
        assert_eq!(session.history.page, 3);
    }
}
