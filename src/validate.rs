//! Validation of free-text user input.
//!
//! Every value typed into a flow (email, one-time code, amount, wallet
//! address) is checked here before it reaches the payout API. Patterns are
//! compile-time validated via the `lazy-regex` crate.

// lazy_regex! uses once_cell internally; patterns are validated at compile time
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use rust_decimal::Decimal;

/// Match a plausible email address
static RE_EMAIL: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$");

/// Match an all-digit one-time code
static RE_OTP: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^[0-9]+$");

/// Match a decimal amount with at most six fractional digits
static RE_AMOUNT: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^[0-9]+(\.[0-9]{1,6})?$");

/// Match a 0x-prefixed EVM wallet address
static RE_EVM_ADDRESS: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^0x[0-9a-fA-F]{40}$");

/// Returns `true` when `input` looks like an email address.
#[must_use]
pub fn is_valid_email(input: &str) -> bool {
    RE_EMAIL.is_match(input.trim())
}

/// Returns `true` when `input` is an all-digit one-time code.
#[must_use]
pub fn is_valid_otp(input: &str) -> bool {
    RE_OTP.is_match(input.trim())
}

/// Returns `true` when `input` is a 0x-prefixed EVM address.
#[must_use]
pub fn is_valid_wallet_address(input: &str) -> bool {
    RE_EVM_ADDRESS.is_match(input.trim())
}

/// Parses a positive decimal amount typed by the user.
///
/// Accepts plain decimals with up to six fractional digits. Zero, negative
/// values, exponents and thousands separators are all rejected.
#[must_use]
pub fn parse_amount(input: &str) -> Option<Decimal> {
    let trimmed = input.trim().replace(',', ".");
    if !RE_AMOUNT.is_match(&trimmed) {
        return None;
    }
    let amount = trimmed.parse::<Decimal>().ok()?;
    if amount <= Decimal::ZERO {
        return None;
    }
    Some(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("  first.last+tag@sub.domain.io  "));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_otp_validation() {
        assert!(is_valid_otp("123456"));
        assert!(is_valid_otp(" 0000 "));
        assert!(!is_valid_otp("12a456"));
        assert!(!is_valid_otp("12 34"));
        assert!(!is_valid_otp(""));
    }

    #[test]
    fn test_wallet_address_validation() {
        assert!(is_valid_wallet_address(
            "0x52908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(!is_valid_wallet_address("0x123"));
        assert!(!is_valid_wallet_address(
            "52908400098527886E0F7030069857D2E4169EE7"
        ));
    }

    #[test]
    fn test_amount_parsing() {
        assert_eq!(parse_amount("10"), Some(Decimal::from(10)));
        assert_eq!(parse_amount("10.5"), "10.5".parse().ok());
        // Comma as decimal separator is tolerated
        assert_eq!(parse_amount("3,25"), "3.25".parse().ok());
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount("-5"), None);
        assert_eq!(parse_amount("1.2345678"), None);
        assert_eq!(parse_amount("1e5"), None);
        assert_eq!(parse_amount("10 USDC"), None);
    }
}
