//! Utility functions for message splitting, truncation and resilient
//! Telegram API calls.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Splits a message into parts that each fit under `max_length` bytes.
///
/// Splits on line boundaries where possible; a single line longer than the
/// limit is split by grapheme clusters so multi-byte characters stay intact.
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }

    if message.len() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in message.lines() {
        // Handle very long lines without newlines (edge case)
        if line.len() > max_length {
            if !current.is_empty() {
                parts.push(current.trim_end().to_string());
                current.clear();
            }

            // Split the long line by grapheme clusters (Unicode-safe)
            let mut chunk = String::new();
            for grapheme in line.graphemes(true) {
                if chunk.len() + grapheme.len() > max_length {
                    parts.push(chunk.trim_end().to_string());
                    chunk.clear();
                }
                chunk.push_str(grapheme);
            }
            if !chunk.is_empty() {
                current.push_str(&chunk);
                current.push('\n');
            }
            continue;
        }

        if current.len() + line.len() + 1 > max_length && !current.is_empty() {
            parts.push(current.trim_end().to_string());
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.is_empty() {
        parts.push(current.trim_end().to_string());
    }

    parts
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use payout_bot::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Shortens a transaction hash for display: `0x1234…cdef`.
///
/// Hashes of 12 characters or fewer come back unchanged.
#[must_use]
pub fn short_hash(hash: &str) -> String {
    let chars: Vec<char> = hash.chars().collect();
    if chars.len() <= 12 {
        return hash.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

/// Retry a Telegram API operation with exponential backoff.
///
/// The retry strategy uses exponential backoff with jitter to avoid
/// thundering herd:
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Max attempts: 3 (configurable via constants in `config.rs`)
///
/// # Errors
///
/// Returns the last error if all attempts fail.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter) // Add jitter to prevent thundering herd
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(
            short_hash("0x8f3c1a9b2e4d5f6a7b8c9d0e1f2a3b4c5d6e7f80"),
            "0x8f3c…7f80"
        );
        assert_eq!(short_hash("0xabc"), "0xabc");
    }

    #[test]
    fn test_split_short_message_is_untouched() {
        let parts = split_long_message("hello\nworld", 100);
        assert_eq!(parts, vec!["hello\nworld".to_string()]);
    }

    #[test]
    fn test_split_long_message_on_lines() {
        let message = "aaaa\nbbbb\ncccc\ndddd";
        let parts = split_long_message(message, 10);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "aaaa\nbbbb");
        assert_eq!(parts[1], "cccc\ndddd");
    }

    #[test]
    fn test_split_very_long_line_by_graphemes() {
        let message = "я".repeat(30);
        let parts = split_long_message(&message, 20);
        assert!(parts.len() >= 2);
        for part in &parts {
            assert!(part.len() <= 20);
            assert!(part.chars().all(|c| c == 'я'));
        }
    }

    #[test]
    fn test_split_empty_message() {
        assert!(split_long_message("", 100).is_empty());
    }
}
