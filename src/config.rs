//! Configuration and settings management
//!
//! Loads settings from environment variables and defines platform constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Base URL of the payout platform API (no trailing slash)
    pub payout_api_url: String,

    /// Pusher application key for the notification channel
    pub pusher_key: Option<String>,

    /// Pusher cluster the notification channel lives in
    #[serde(default = "default_pusher_cluster")]
    pub pusher_cluster: String,

    /// Full websocket URL override; takes precedence over key/cluster
    pub pusher_ws_url: Option<String>,

    /// Port the liveness endpoint listens on
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Path of the single-instance lock file
    #[serde(default = "default_lock_path")]
    pub instance_lock_path: String,

    /// Timeout for payout API requests, in seconds
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
}

fn default_pusher_cluster() -> String {
    "mt1".to_string()
}

const fn default_health_port() -> u16 {
    8080
}

fn default_lock_path() -> String {
    "/tmp/payout-bot.lock".to_string()
}

const fn default_api_timeout_secs() -> u64 {
    30
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use payout_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(File::with_name("config/default").required(false))
            // Add in the current environment file
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of APP)
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Also add settings from environment variables directly (without prefix)
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check environment variables directly if config didn't pick them up
        if settings.pusher_key.is_none() {
            if let Ok(val) = std::env::var("PUSHER_KEY") {
                if !val.is_empty() {
                    settings.pusher_key = Some(val);
                }
            }
        }
        if settings.pusher_ws_url.is_none() {
            if let Ok(val) = std::env::var("PUSHER_WS_URL") {
                if !val.is_empty() {
                    settings.pusher_ws_url = Some(val);
                }
            }
        }

        Ok(settings)
    }

    /// Timeout applied to every payout API request
    #[must_use]
    pub const fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Websocket URL of the notification channel, if configured.
    ///
    /// An explicit `pusher_ws_url` override wins; otherwise the URL is built
    /// from the application key and cluster. `None` disables the bridge.
    #[must_use]
    pub fn websocket_url(&self) -> Option<String> {
        if let Some(url) = &self.pusher_ws_url {
            return Some(url.clone());
        }
        self.pusher_key.as_ref().map(|key| {
            format!(
                "wss://ws-{}.pusher.com/app/{}?protocol=7&client=payout-bot&version={}",
                self.pusher_cluster,
                key,
                env!("CARGO_PKG_VERSION")
            )
        })
    }
}

/// Information about a supported deposit network
#[derive(Debug, Clone, Serialize)]
pub struct ChainInfo {
    /// EVM chain id sent to the deposit endpoint
    pub chain_id: u64,
    /// Human-readable network name shown on buttons
    pub label: &'static str,
    /// Network code the wallet endpoints understand
    pub network: &'static str,
}

/// Networks a deposit can be created on
pub const SUPPORTED_CHAINS: &[ChainInfo] = &[
    ChainInfo {
        chain_id: 137,
        label: "Polygon",
        network: "polygon",
    },
    ChainInfo {
        chain_id: 1,
        label: "Ethereum",
        network: "ethereum",
    },
    ChainInfo {
        chain_id: 8453,
        label: "Base",
        network: "base",
    },
];

/// Look up a supported chain by its id
#[must_use]
pub fn chain_by_id(chain_id: u64) -> Option<&'static ChainInfo> {
    SUPPORTED_CHAINS.iter().find(|c| c.chain_id == chain_id)
}

/// Funds-source tag attached to every deposit request
pub const DEPOSIT_FUNDS_SOURCE: &str = "external_wallet";
/// Smallest deposit amount the bot accepts, in whole currency units
pub const MIN_DEPOSIT_UNITS: u64 = 1;

// Token lifecycle
/// Seconds before the recorded expiry at which a token counts as stale
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300; // 5 minutes
/// Fallback token lifetime when the API omits `expiresIn`
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 86_400; // 24 hours

// History rendering
/// Transfers shown per history page
pub const HISTORY_PAGE_SIZE: u32 = 5;

// Telegram API retry tuning
/// Initial backoff delay for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff delay for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum retry attempts for Telegram API operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Tests run sequentially inside one function to avoid environment
    // variable race conditions
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        // 1. Standard loading with required fields present
        env::set_var("TELEGRAM_TOKEN", "dummy_token");
        env::set_var("PAYOUT_API_URL", "https://api.example.com");
        env::set_var("PUSHER_KEY", "app-key-1");

        let settings = Settings::new()?;
        assert_eq!(settings.payout_api_url, "https://api.example.com");
        assert_eq!(settings.pusher_key, Some("app-key-1".to_string()));
        assert_eq!(settings.pusher_cluster, "mt1");
        assert_eq!(settings.health_port, 8080);
        assert_eq!(settings.api_timeout_secs, 30);

        env::remove_var("PUSHER_KEY");

        // 2. Empty env var is treated as unset
        env::set_var("PUSHER_KEY", "");
        let settings = Settings::new()?;
        assert_eq!(settings.pusher_key, None);
        assert!(settings.websocket_url().is_none());

        env::remove_var("PUSHER_KEY");

        // 3. Explicit websocket override wins over key/cluster
        env::set_var("PUSHER_KEY", "app-key-2");
        env::set_var("PUSHER_WS_URL", "ws://127.0.0.1:9999/app/test");
        let settings = Settings::new()?;
        assert_eq!(
            settings.websocket_url(),
            Some("ws://127.0.0.1:9999/app/test".to_string())
        );

        env::remove_var("PUSHER_WS_URL");
        env::remove_var("PUSHER_KEY");
        env::remove_var("PAYOUT_API_URL");
        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }

    #[test]
    fn test_websocket_url_from_key() {
        let settings = Settings {
            telegram_token: "dummy".to_string(),
            payout_api_url: "https://api.example.com".to_string(),
            pusher_key: Some("abc123".to_string()),
            pusher_cluster: "eu".to_string(),
            pusher_ws_url: None,
            health_port: 8080,
            instance_lock_path: "/tmp/test.lock".to_string(),
            api_timeout_secs: 30,
        };

        let url = settings.websocket_url().unwrap_or_default();
        assert!(url.starts_with("wss://ws-eu.pusher.com/app/abc123?protocol=7"));
    }

    #[test]
    fn test_chain_lookup() {
        assert_eq!(chain_by_id(137).map(|c| c.label), Some("Polygon"));
        assert!(chain_by_id(999_999).is_none());
    }
}
