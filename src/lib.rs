//! Telegram front-end for a payout platform account.
//!
//! Lets a user sign in with an email one-time code, inspect wallets and
//! balances, move funds (email transfers, on-chain sends, bank withdrawals,
//! deposits) and receive real-time transaction notifications pushed over a
//! websocket channel.

#![deny(missing_docs)]

/// Typed client for the payout platform REST API
pub mod api;
/// Telegram command, keyboard and callback plumbing
pub mod bot;
/// Configuration loading and tunables
pub mod config;
/// Conversation flows (login, transfers, deposits, history)
pub mod flows;
/// Single-instance file lock
pub mod lock;
/// Real-time transaction notification bridge
pub mod notify;
/// HTTP liveness endpoint
pub mod server;
/// Per-chat session state
pub mod session;
/// Access token lifecycle
pub mod token;
/// User input validation
pub mod validate;

pub mod utils;
