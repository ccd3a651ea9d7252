//! Wallet views and management.
//!
//! Wallets are platform-side; this module only lists them, shows their
//! balances, flips which one is the default, and asks the platform to
//! create new ones on a supported network.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use teloxide::prelude::*;

use crate::api::types::Wallet;
use crate::api::ApiClient;
use crate::bot::{keyboards, messaging};
use crate::flows::{guest_hint, report_api_error};
use crate::session::Session;

/// Lists the account's wallets with management buttons.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn show_wallets(
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
            // Copy-address buttons index into this list
            session.wallet_addresses = wallets
                .iter()
                .map(|wallet| wallet.address.clone())
                .collect();

            let text = if wallets.is_empty() {
                "👛 You have no wallets yet.".to_string()
            } else {
                render_wallets(&wallets)
            };
            messaging::send_html_with_markup(
                bot,
                chat,
                &text,
                keyboards::wallets_keyboard(&wallets),
            )
            .await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Copy-address button: reposts one address bare, so a tap on the message
/// copies it.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn copy_address(
    bot: &Bot,
    chat: ChatId,
    session: &mut Session,
    index: usize,
) -> anyhow::Result<()> {
    let Some(address) = session.wallet_addresses.get(index) else {
        return crate::flows::stale_button(bot, chat).await;
    };
    let text = format!("<code>{}</code>", html_escape::encode_text(address));
    messaging::send_html(bot, chat, &text).await
}

/// Shows per-wallet balances and per-currency totals.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn show_balance(
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
            if wallets.is_empty() {
                return messaging::send_html(
                    bot,
                    chat,
                    "💰 You have no wallets yet. Create one under Wallets.",
                )
                .await;
            }

            let mut text = String::from("💰 <b>Balances</b>\n");
            for wallet in &wallets {
                let marker = if wallet.is_default { " ⭐" } else { "" };
                text.push_str(&format!(
                    "\n{}: {} {}{marker}",
                    html_escape::encode_text(&wallet.network),
                    wallet.balance,
                    html_escape::encode_text(&wallet.currency),
                ));
            }

            // BTreeMap keeps the totals in a stable order
            let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
            for wallet in &wallets {
                *totals.entry(wallet.currency.as_str()).or_default() += wallet.balance;
            }
            text.push('\n');
            for (currency, total) in totals {
                text.push_str(&format!(
                    "\nTotal {}: <b>{total}</b>",
                    html_escape::encode_text(currency)
                ));
            }
            messaging::send_html(bot, chat, &text).await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Default-wallet button: makes the given wallet the one transfers draw
/// from, then re-renders the list.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn make_default(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    wallet_id: &str,
) -> anyhow::Result<()> {
    let result = match session.user.as_mut() {
        Some(user) => api.set_default_wallet(&mut user.tokens, wallet_id).await,
        None => return guest_hint(bot, chat).await,
    };

    match result {
        Ok(()) => {
            messaging::send_html(bot, chat, "⭐ Default wallet updated.").await?;
            show_wallets(bot, api, chat, session).await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// New-wallet button: asks which network to create on.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn open_generate(bot: &Bot, chat: ChatId, session: &mut Session) -> anyhow::Result<()> {
    if session.user.is_none() {
        return guest_hint(bot, chat).await;
    }
    messaging::send_html_with_markup(
        bot,
        chat,
        "➕ Pick the network for the new wallet:",
        keyboards::wallet_generate_keyboard(),
    )
    .await
}

/// Network button under the new-wallet prompt: creates the wallet.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn generate(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    network: &str,
) -> anyhow::Result<()> {
    let created = match session.user.as_mut() {
        Some(user) => api.generate_wallet(&mut user.tokens, network).await,
        None => return guest_hint(bot, chat).await,
    };

    match created {
        Ok(wallet) => {
            let mut text = format!(
                "✅ New <b>{}</b> wallet created.",
                html_escape::encode_text(&wallet.network)
            );
            if !wallet.address.is_empty() {
                text.push_str(&format!(
                    "\n<code>{}</code>",
                    html_escape::encode_text(&wallet.address)
                ));
            }
            messaging::send_html(bot, chat, &text).await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Wallet list as HTML, default first.
fn render_wallets(wallets: &[Wallet]) -> String {
    let mut text = String::from("👛 <b>Your wallets</b>\n");
    let ordered = wallets
        .iter()
        .filter(|wallet| wallet.is_default)
        .chain(wallets.iter().filter(|wallet| !wallet.is_default));
    for wallet in ordered {
        let marker = if wallet.is_default { "⭐" } else { "▫️" };
        text.push_str(&format!(
            "\n{marker} {} — {} {}",
            html_escape::encode_text(&wallet.network),
            wallet.balance,
            html_escape::encode_text(&wallet.currency),
        ));
        if !wallet.address.is_empty() {
            text.push_str(&format!(
                "\n<code>{}</code>",
                html_escape::encode_text(&wallet.address)
            ));
        }
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(network: &str, balance: i64, is_default: bool) -> Wallet {
        Wallet {
            id: format!("w_{network}"),
            address: format!("0x{network:0>40}"),
            network: network.to_string(),
            currency: "USDC".to_string(),
            balance: Decimal::from(balance),
            is_default,
        }
    }

    #[test]
    fn test_render_wallets_puts_default_first() {
        let wallets = vec![wallet("base", 10, false), wallet("polygon", 250, true)];
        let text = render_wallets(&wallets);
        let polygon = text.find("polygon").unwrap();
        let base = text.find("base").unwrap();
        assert!(polygon < base);
        assert!(text.contains("⭐ polygon"));
    }

    #[test]
    fn test_render_wallets_skips_withheld_addresses() {
        let mut hidden = wallet("polygon", 5, true);
        hidden.address = String::new();
        let text = render_wallets(&[hidden]);
        assert!(!text.contains("<code>"));
    }
}
