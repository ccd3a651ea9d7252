//! Bot command definitions.

use teloxide::utils::command::BotCommands;

/// Slash commands the bot understands.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greeting plus the main menu
    #[command(description = "Start and show the menu.")]
    Start,
    /// Command reference
    #[command(description = "Show what this bot can do.")]
    Help,
    /// Begin the email sign-in exchange
    #[command(description = "Sign in with your email.")]
    Login,
    /// End the signed-in session
    #[command(description = "Sign out.")]
    Logout,
    /// Show account details
    #[command(description = "Show your profile.")]
    Profile,
    /// Show verification status
    #[command(description = "Show your verification status.")]
    Kyc,
    /// Manage wallets
    #[command(description = "Manage your wallets.")]
    Wallets,
    /// Show wallet balances
    #[command(description = "Show your balances.")]
    Balance,
    /// Start a transfer
    #[command(description = "Send funds.")]
    Send,
    /// Start a bank withdrawal
    #[command(description = "Withdraw to your bank account.")]
    Withdraw,
    /// Start a deposit
    #[command(description = "Top up your balance.")]
    Deposit,
    /// Show transfer history
    #[command(description = "Show your transfer history.")]
    History,
    /// Abort whatever flow is in progress
    #[command(description = "Cancel the current operation.")]
    Cancel,
}
