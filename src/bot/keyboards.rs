//! Keyboard builders, button labels and callback data.
//!
//! Reply-keyboard labels double as routing keys: the text router matches
//! incoming messages against these constants before treating them as flow
//! input. Callback data uses short `prefix:value` strings.

use crate::api::types::Wallet;
use crate::config::SUPPORTED_CHAINS;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

// Reply-keyboard labels
/// Main menu: sign in
pub const BTN_LOGIN: &str = "🔑 Sign in";
/// Main menu: help
pub const BTN_HELP: &str = "❓ Help";
/// Main menu: balances
pub const BTN_BALANCE: &str = "💰 Balance";
/// Main menu: transfer history
pub const BTN_HISTORY: &str = "📜 History";
/// Main menu: send funds
pub const BTN_SEND: &str = "💸 Send";
/// Main menu: bank withdrawal
pub const BTN_WITHDRAW: &str = "🏦 Withdraw";
/// Main menu: deposit
pub const BTN_DEPOSIT: &str = "📥 Deposit";
/// Main menu: wallet management
pub const BTN_WALLETS: &str = "👛 Wallets";
/// Main menu: profile
pub const BTN_PROFILE: &str = "👤 Profile";
/// Main menu: sign out
pub const BTN_LOGOUT: &str = "🚪 Sign out";

// Callback data
/// Ask for a fresh one-time code
pub const CB_LOGIN_NEW_OTP: &str = "login:new-otp";
/// Abort the login exchange
pub const CB_LOGIN_CANCEL: &str = "login:cancel";
/// Pick the email transfer variant
pub const CB_SEND_EMAIL: &str = "send:email";
/// Pick the wallet transfer variant
pub const CB_SEND_WALLET: &str = "send:wallet";
/// Pick the batch transfer variant
pub const CB_SEND_BATCH: &str = "send:batch";
/// Execute the summarized transfer
pub const CB_TRANSFER_CONFIRM: &str = "transfer:confirm";
/// Abort the summarized transfer
pub const CB_TRANSFER_CANCEL: &str = "transfer:cancel";
/// Followed by a network code for wallet transfers
pub const CB_NETWORK_PREFIX: &str = "net:";
/// Followed by a chain id for deposits
pub const CB_CHAIN_PREFIX: &str = "chain:";
/// History: previous page
pub const CB_HISTORY_PREV: &str = "history:prev";
/// History: next page
pub const CB_HISTORY_NEXT: &str = "history:next";
/// History: refetch the current page
pub const CB_HISTORY_REFRESH: &str = "history:refresh";
/// Followed by a transfer id for the detail view
pub const CB_HISTORY_ITEM_PREFIX: &str = "history:item:";
/// Followed by a wallet id to make it the default
pub const CB_WALLET_DEFAULT_PREFIX: &str = "wallet:default:";
/// Show network choices for generating a wallet
pub const CB_WALLET_GENERATE: &str = "wallet:generate";
/// Followed by a network code to generate a wallet on
pub const CB_WALLET_GEN_PREFIX: &str = "wallet:gen:";
/// Followed by an index into the session's last wallet listing; the
/// address itself does not fit in callback data
pub const CB_WALLET_ADDR_PREFIX: &str = "wallet:addr:";

/// Get the persistent main menu for the chat's auth state.
///
/// # Examples
///
/// ```
/// use payout_bot::bot::keyboards::main_menu;
/// let keyboard = main_menu(false);
/// assert!(!keyboard.keyboard.is_empty());
/// ```
#[must_use]
pub fn main_menu(authenticated: bool) -> KeyboardMarkup {
    let rows = if authenticated {
        vec![
            vec![
                KeyboardButton::new(BTN_BALANCE),
                KeyboardButton::new(BTN_HISTORY),
            ],
            vec![
                KeyboardButton::new(BTN_SEND),
                KeyboardButton::new(BTN_WITHDRAW),
            ],
            vec![
                KeyboardButton::new(BTN_DEPOSIT),
                KeyboardButton::new(BTN_WALLETS),
            ],
            vec![
                KeyboardButton::new(BTN_PROFILE),
                KeyboardButton::new(BTN_LOGOUT),
            ],
        ]
    } else {
        vec![vec![
            KeyboardButton::new(BTN_LOGIN),
            KeyboardButton::new(BTN_HELP),
        ]]
    };
    KeyboardMarkup::new(rows).resize_keyboard()
}

/// Get the retry keyboard shown after a failed code check.
#[must_use]
pub fn login_retry_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🔁 New code", CB_LOGIN_NEW_OTP),
        InlineKeyboardButton::callback("❌ Cancel", CB_LOGIN_CANCEL),
    ]])
}

/// Get the transfer variant picker.
#[must_use]
pub fn transfer_kind_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("📧 By email", CB_SEND_EMAIL),
            InlineKeyboardButton::callback("🔗 To wallet", CB_SEND_WALLET),
        ],
        vec![InlineKeyboardButton::callback(
            "📑 Several at once",
            CB_SEND_BATCH,
        )],
    ])
}

/// Get one button per network the user can send from.
#[must_use]
pub fn network_keyboard(networks: &[String]) -> InlineKeyboardMarkup {
    let rows = networks
        .iter()
        .map(|network| {
            vec![InlineKeyboardButton::callback(
                network.clone(),
                format!("{CB_NETWORK_PREFIX}{network}"),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

/// Get the confirm/cancel pair for the transfer summary.
#[must_use]
pub fn confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Confirm", CB_TRANSFER_CONFIRM),
        InlineKeyboardButton::callback("❌ Cancel", CB_TRANSFER_CANCEL),
    ]])
}

/// Get one button per chain a deposit can be created on.
#[must_use]
pub fn chain_keyboard() -> InlineKeyboardMarkup {
    let rows = SUPPORTED_CHAINS
        .iter()
        .map(|chain| {
            vec![InlineKeyboardButton::callback(
                chain.label,
                format!("{CB_CHAIN_PREFIX}{}", chain.chain_id),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

/// Get the history view keyboard: one row per transfer, then paging.
///
/// `items` pairs a button label with the transfer id it drills into.
#[must_use]
pub fn history_keyboard(
    page: u32,
    total_pages: u32,
    items: &[(String, String)],
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = items
        .iter()
        .map(|(label, id)| {
            vec![InlineKeyboardButton::callback(
                label.clone(),
                format!("{CB_HISTORY_ITEM_PREFIX}{id}"),
            )]
        })
        .collect();
    rows.push(vec![
        InlineKeyboardButton::callback("⬅️", CB_HISTORY_PREV),
        InlineKeyboardButton::callback(format!("{page}/{total_pages}"), CB_HISTORY_REFRESH),
        InlineKeyboardButton::callback("➡️", CB_HISTORY_NEXT),
    ]);
    InlineKeyboardMarkup::new(rows)
}

/// Get the wallet management keyboard: a copy-address button per wallet
/// with a known address, a make-default button per non-default wallet,
/// then the generate entry.
#[must_use]
pub fn wallets_keyboard(wallets: &[Wallet]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for (index, wallet) in wallets.iter().enumerate() {
        let mut row = Vec::new();
        if !wallet.address.is_empty() {
            row.push(InlineKeyboardButton::callback(
                format!("📋 {} address", wallet.network),
                format!("{CB_WALLET_ADDR_PREFIX}{index}"),
            ));
        }
        if !wallet.is_default {
            row.push(InlineKeyboardButton::callback(
                format!("⭐ Make default: {}", wallet.network),
                format!("{CB_WALLET_DEFAULT_PREFIX}{}", wallet.id),
            ));
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "➕ New wallet",
        CB_WALLET_GENERATE,
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Get one button per network a wallet can be generated on.
#[must_use]
pub fn wallet_generate_keyboard() -> InlineKeyboardMarkup {
    let rows = SUPPORTED_CHAINS
        .iter()
        .map(|chain| {
            vec![InlineKeyboardButton::callback(
                chain.label,
                format!("{CB_WALLET_GEN_PREFIX}{}", chain.network),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_main_menu_depends_on_auth_state() {
        let guest = main_menu(false);
        assert_eq!(guest.keyboard.len(), 1);

        let authed = main_menu(true);
        assert_eq!(authed.keyboard.len(), 4);
    }

    #[test]
    fn test_chain_keyboard_covers_supported_chains() {
        let keyboard = chain_keyboard();
        assert_eq!(keyboard.inline_keyboard.len(), SUPPORTED_CHAINS.len());
    }

    #[test]
    fn test_history_keyboard_shape() {
        let items = vec![
            ("10 USDC → a@b".to_string(), "t1".to_string()),
            ("5 USDC → c@d".to_string(), "t2".to_string()),
        ];
        let keyboard = history_keyboard(2, 4, &items);
        // Two item rows plus the paging row
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        let nav = &keyboard.inline_keyboard[2];
        assert_eq!(nav.len(), 3);
        assert_eq!(nav[1].text, "2/4");
    }

    #[test]
    fn test_wallets_keyboard_skips_default_wallet() {
        let wallets = vec![
            Wallet {
                id: "w1".to_string(),
                address: "0xAAA".to_string(),
                network: "polygon".to_string(),
                currency: "USDC".to_string(),
                balance: Decimal::ZERO,
                is_default: true,
            },
            Wallet {
                id: "w2".to_string(),
                address: "0xBBB".to_string(),
                network: "base".to_string(),
                currency: "USDC".to_string(),
                balance: Decimal::ZERO,
                is_default: false,
            },
        ];
        let keyboard = wallets_keyboard(&wallets);
        // Copy row for w1, copy + make-default row for w2, generate row
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert_eq!(keyboard.inline_keyboard[0].len(), 1);
        assert_eq!(keyboard.inline_keyboard[1].len(), 2);
    }
}
