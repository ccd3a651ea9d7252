//! Access token lifecycle for one signed-in session.
//!
//! Each chat session owns its token; nothing here is shared across chats.
//! Expiry is tracked with a safety buffer so tokens are refreshed shortly
//! before the platform would start rejecting them.

use crate::config::{DEFAULT_TOKEN_TTL_SECS, TOKEN_EXPIRY_BUFFER_SECS};
use chrono::{DateTime, Duration, Utc};

/// Holds the access token of one signed-in chat session.
#[derive(Debug, Default, Clone)]
pub struct TokenStore {
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenStore {
    /// Creates an empty store with no token.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            access_token: None,
            expires_at: None,
        }
    }

    /// Records a freshly issued token.
    ///
    /// `ttl_secs` is the lifetime reported by the API; when the API omits
    /// one, a 24 hour fallback applies.
    pub fn set(&mut self, token: impl Into<String>, ttl_secs: Option<i64>) {
        let ttl = ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        self.access_token = Some(token.into());
        self.expires_at = Some(Utc::now() + Duration::seconds(ttl));
    }

    /// Current token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Whether the stored token is past (or within the safety buffer of)
    /// its expiry. An empty store is not "expired"; there is nothing to
    /// refresh.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match (&self.access_token, &self.expires_at) {
            (Some(_), Some(expires_at)) => {
                Utc::now() >= *expires_at - Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS)
            }
            _ => false,
        }
    }

    /// Drops the token and its expiry.
    pub fn clear(&mut self) {
        self.access_token = None;
        self.expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_is_not_expired() {
        let mut store = TokenStore::new();
        store.set("tok", Some(3600));
        assert_eq!(store.token(), Some("tok"));
        assert!(!store.is_expired());
    }

    #[test]
    fn test_default_ttl_applies() {
        let mut store = TokenStore::new();
        store.set("tok", None);
        // 24h default is far outside the 5 minute buffer
        assert!(!store.is_expired());
    }

    #[test]
    fn test_token_inside_buffer_counts_as_expired() {
        let mut store = TokenStore::new();
        // Expiry 200s away is inside the 300s buffer
        store.set("tok", Some(200));
        assert!(store.is_expired());
        // Token stays readable so a refresh call can still present it
        assert_eq!(store.token(), Some("tok"));
    }

    #[test]
    fn test_empty_store_is_not_expired() {
        let store = TokenStore::new();
        assert!(store.token().is_none());
        assert!(!store.is_expired());
    }

    #[test]
    fn test_clear_removes_token() {
        let mut store = TokenStore::new();
        store.set("tok", Some(3600));
        store.clear();
        assert!(store.token().is_none());
        assert!(!store.is_expired());
    }
}
