//! Typed client for the payout platform REST API.
//!
//! One [`ApiClient`] is shared by every chat. Authentication is per call:
//! handlers pass in the session's [`TokenStore`], and the client takes care
//! of bearer attachment, pre-expiry refresh, and a single refresh-and-retry
//! on 401. Responses are decoded into the normalized records from
//! [`types`]; payloads never leak out raw.

pub mod types;

use crate::config::{Settings, DEPOSIT_FUNDS_SOURCE};
use crate::token::TokenStore;
use crate::utils::truncate_str;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use types::{
    AuthTokens, Deposit, EligibilityResponse, FeeInfo, KycResponse, KycStatus, OtpSession, Page,
    Profile, RawDeposit, RawFee, RawPage, RawProfile, RawTransfer, RawWallet, Transfer, UserLookup,
    Wallet,
};

/// Errors surfaced by payout API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request hit the client-side timeout
    #[error("request timed out")]
    Timeout,
    /// DNS, TCP or TLS level failure
    #[error("network error: {0}")]
    Network(String),
    /// The platform rejected the token, after any refresh attempt
    #[error("unauthorized")]
    Unauthorized,
    /// The record or route does not exist
    #[error("not found")]
    NotFound,
    /// The platform asked us to slow down
    #[error("rate limited")]
    RateLimited {
        /// Seconds to wait, from the Retry-After header when present
        retry_after: Option<u64>,
    },
    /// The request body failed server-side validation (422)
    #[error("validation failed: {0}")]
    Validation(String),
    /// Any other non-success status
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, truncated and with HTML pages stripped
        message: String,
    },
    /// A 2xx body did not match the expected shape
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl ApiError {
    /// One-line, HTML-safe message shown to the user when a flow fails.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout => {
                "⏳ The service is taking too long to respond. Please try again.".to_string()
            }
            Self::Network(_) => {
                "📡 Network trouble reaching the service. Please try again.".to_string()
            }
            Self::Unauthorized => {
                "🔒 Your session has expired. Use /login to sign in again.".to_string()
            }
            Self::NotFound => "🔍 The requested record was not found.".to_string(),
            Self::RateLimited { retry_after } => retry_after.map_or_else(
                || "🚦 Too many requests. Please wait a moment and try again.".to_string(),
                |secs| format!("🚦 Too many requests. Try again in {secs}s."),
            ),
            Self::Validation(msg) => format!("⚠️ {}", html_escape::encode_text(msg)),
            Self::Api { .. } | Self::Decode(_) => {
                "❌ The service returned an error. Please try again later.".to_string()
            }
        }
    }
}

/// Client for the payout platform REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for the API at `base_url` with the given request
    /// timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Creates a client from loaded [`Settings`].
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.payout_api_url.clone(), settings.api_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Network(e.to_string())
            }
        })
    }

    /// Exchanges the current token for a fresh one and records it.
    async fn refresh_token(&self, tokens: &mut TokenStore) -> Result<(), ApiError> {
        let Some(old) = tokens.token().map(str::to_owned) else {
            return Err(ApiError::Unauthorized);
        };
        let response = self
            .send_once(&Method::POST, "/api/auth/refresh", None, None, Some(&old))
            .await?;
        let value = Self::decode_response(response).await?;
        let fresh: AuthTokens = Self::parse(value)?;
        tokens.set(fresh.access_token, fresh.expires_in);
        debug!("Access token refreshed");
        Ok(())
    }

    /// Sends one API request with the full token discipline applied:
    /// refresh before sending when the stored token is stale, and at most
    /// one refresh-and-retry when the platform answers 401.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<Value>,
        mut tokens: Option<&mut TokenStore>,
    ) -> Result<Value, ApiError> {
        // One refresh per call, whether it happens before or after the send.
        let mut can_retry = true;
        if let Some(store) = tokens.as_deref_mut() {
            if store.is_expired() {
                can_retry = false;
                if let Err(e) = self.refresh_token(store).await {
                    warn!("Pre-flight token refresh failed: {e}");
                    store.clear();
                }
            }
        }

        let bearer = tokens
            .as_deref()
            .and_then(TokenStore::token)
            .map(str::to_owned);
        let response = self
            .send_once(&method, path, query, body.as_ref(), bearer.as_deref())
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED && can_retry {
            if let Some(store) = tokens.as_deref_mut() {
                if store.token().is_some() {
                    debug!("401 from {path}, refreshing token and retrying once");
                    if self.refresh_token(store).await.is_ok() {
                        let bearer = store.token().map(str::to_owned);
                        let retry = self
                            .send_once(&method, path, query, body.as_ref(), bearer.as_deref())
                            .await?;
                        return Self::decode_response(retry).await;
                    }
                    store.clear();
                    return Err(ApiError::Unauthorized);
                }
            }
        }

        Self::decode_response(response).await
    }

    async fn decode_response(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()));
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let text = response.text().await.unwrap_or_default();
        Err(Self::classify_error(status, retry_after, &text))
    }

    fn classify_error(status: StatusCode, retry_after: Option<u64>, body_text: &str) -> ApiError {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::NOT_FOUND => ApiError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited { retry_after },
            StatusCode::UNPROCESSABLE_ENTITY => {
                let formatted = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .as_ref()
                    .and_then(types::format_validation_errors);
                ApiError::Validation(
                    formatted.unwrap_or_else(|| truncate_str(body_text, 200)),
                )
            }
            _ => {
                // Detect HTML error pages from proxies; never echo raw HTML
                let trimmed = body_text.trim_start();
                let is_html = trimmed.starts_with("<!DOCTYPE")
                    || trimmed.starts_with("<html")
                    || trimmed.starts_with("<HTML");
                let message = if is_html {
                    "server returned an HTML error page".to_string()
                } else {
                    truncate_str(body_text, 500)
                };
                ApiError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }

    fn parse<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Lists that arrive either as a bare array or inside a page envelope.
    fn parse_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, ApiError> {
        match value {
            Value::Array(_) => Self::parse(value),
            Value::Object(_) => Ok(Self::parse::<RawPage<T>>(value)?.normalize(1, 1).items),
            Value::Null => Ok(Vec::new()),
            other => Err(ApiError::Decode(format!(
                "expected a list, got {other}"
            ))),
        }
    }

    // ─── Auth ────────────────────────────────────────────────────────────

    /// Asks the platform to email a one-time code to `email`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails or the response is
    /// malformed.
    pub async fn request_otp(&self, email: &str) -> Result<OtpSession, ApiError> {
        let body = json!({ "email": email });
        let value = self
            .request(Method::POST, "/api/auth/otp", None, Some(body), None)
            .await?;
        Self::parse(value)
    }

    /// Exchanges an emailed code for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for wrong or expired codes and
    /// [`ApiError::RateLimited`] when too many attempts were made.
    pub async fn verify_otp(
        &self,
        email: &str,
        otp: &str,
        sid: &str,
    ) -> Result<AuthTokens, ApiError> {
        let body = json!({ "email": email, "otp": otp, "sid": sid });
        let value = self
            .request(Method::POST, "/api/auth/verify", None, Some(body), None)
            .await?;
        Self::parse(value)
    }

    // ─── Profile / KYC ───────────────────────────────────────────────────

    /// Fetches the signed-in account's profile.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails.
    pub async fn profile(&self, tokens: &mut TokenStore) -> Result<Profile, ApiError> {
        let value = self
            .request(Method::GET, "/api/users/me", None, None, Some(tokens))
            .await?;
        Ok(Self::parse::<RawProfile>(value)?.normalize())
    }

    /// Fetches the account's verification status.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails.
    pub async fn kyc_status(&self, tokens: &mut TokenStore) -> Result<KycStatus, ApiError> {
        let value = self
            .request(Method::GET, "/api/kyc/status", None, None, Some(tokens))
            .await?;
        let response: KycResponse = Self::parse(value)?;
        Ok(KycStatus::parse(&response.status))
    }

    // ─── Wallets ─────────────────────────────────────────────────────────

    /// Lists the account's wallets.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails.
    pub async fn wallets(&self, tokens: &mut TokenStore) -> Result<Vec<Wallet>, ApiError> {
        let value = self
            .request(Method::GET, "/api/wallets", None, None, Some(tokens))
            .await?;
        let raws: Vec<RawWallet> = Self::parse_list(value)?;
        Ok(raws.into_iter().map(RawWallet::normalize).collect())
    }

    /// Fetches the account's default wallet, or `None` when none is set.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails for any reason other
    /// than the wallet not existing.
    pub async fn default_wallet(
        &self,
        tokens: &mut TokenStore,
    ) -> Result<Option<Wallet>, ApiError> {
        match self
            .request(Method::GET, "/api/wallets/default", None, None, Some(tokens))
            .await
        {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(Self::parse::<RawWallet>(value)?.normalize())),
            Err(ApiError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Marks a wallet as the account default.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails.
    pub async fn set_default_wallet(
        &self,
        tokens: &mut TokenStore,
        wallet_id: &str,
    ) -> Result<(), ApiError> {
        let body = json!({ "walletId": wallet_id });
        self.request(
            Method::PATCH,
            "/api/wallets/default",
            None,
            Some(body),
            Some(tokens),
        )
        .await?;
        Ok(())
    }

    /// Generates a wallet on `network` for the account.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails.
    pub async fn generate_wallet(
        &self,
        tokens: &mut TokenStore,
        network: &str,
    ) -> Result<Wallet, ApiError> {
        let body = json!({ "network": network });
        let value = self
            .request(Method::POST, "/api/wallets", None, Some(body), Some(tokens))
            .await?;
        Ok(Self::parse::<RawWallet>(value)?.normalize())
    }

    // ─── Transfers ───────────────────────────────────────────────────────

    /// Fetches one page of the account's transfer history.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails.
    pub async fn transfers(
        &self,
        tokens: &mut TokenStore,
        page: u32,
        limit: u32,
    ) -> Result<Page<Transfer>, ApiError> {
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        let value = self
            .request(
                Method::GET,
                "/api/transfers",
                Some(&query),
                None,
                Some(tokens),
            )
            .await?;
        let raw: Page<RawTransfer> = match value {
            Value::Array(_) => Page {
                items: Self::parse(value)?,
                page,
                limit,
                total_pages: 1,
            },
            other => Self::parse::<RawPage<RawTransfer>>(other)?.normalize(page, limit),
        };
        Ok(raw.map(RawTransfer::normalize))
    }

    /// Fetches one transfer by id.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for unknown ids.
    pub async fn transfer(
        &self,
        tokens: &mut TokenStore,
        transfer_id: &str,
    ) -> Result<Transfer, ApiError> {
        let path = format!("/api/transfers/{transfer_id}");
        let value = self
            .request(Method::GET, &path, None, None, Some(tokens))
            .await?;
        Ok(Self::parse::<RawTransfer>(value)?.normalize())
    }

    /// Quotes the fee for transferring `amount`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the request fails.
    pub async fn transfer_fee(
        &self,
        tokens: &mut TokenStore,
        amount: Decimal,
    ) -> Result<FeeInfo, ApiError> {
        let query = [("amount", amount.to_string())];
        let value = self
            .request(
                Method::GET,
                "/api/transfers/fee",
                Some(&query),
                None,
                Some(tokens),
            )
            .await?;
        Ok(Self::parse::<RawFee>(value)?.normalize())
    }

    /// Sends `amount` to another platform user by email.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the transfer is rejected; recipient
    /// ineligibility arrives as [`ApiError::Validation`] with a telling
    /// message.
    pub async fn send_by_email(
        &self,
        tokens: &mut TokenStore,
        recipient_email: &str,
        amount: Decimal,
    ) -> Result<Transfer, ApiError> {
        let body = json!({ "recipientEmail": recipient_email, "amount": amount });
        let value = self
            .request(
                Method::POST,
                "/api/transfers/send-email",
                None,
                Some(body),
                Some(tokens),
            )
            .await?;
        Ok(Self::parse::<RawTransfer>(value)?.normalize())
    }

    /// Sends `amount` to an external wallet address on `network`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the transfer is rejected.
    pub async fn send_by_wallet(
        &self,
        tokens: &mut TokenStore,
        wallet_address: &str,
        network: &str,
        amount: Decimal,
    ) -> Result<Transfer, ApiError> {
        let body = json!({
            "walletAddress": wallet_address,
            "network": network,
            "amount": amount
        });
        let value = self
            .request(
                Method::POST,
                "/api/transfers/send-wallet",
                None,
                Some(body),
                Some(tokens),
            )
            .await?;
        Ok(Self::parse::<RawTransfer>(value)?.normalize())
    }

    /// Withdraws `amount` to the account's linked bank account.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the withdrawal is rejected.
    pub async fn withdraw_to_bank(
        &self,
        tokens: &mut TokenStore,
        amount: Decimal,
    ) -> Result<Transfer, ApiError> {
        let body = json!({ "amount": amount });
        let value = self
            .request(
                Method::POST,
                "/api/transfers/withdraw",
                None,
                Some(body),
                Some(tokens),
            )
            .await?;
        Ok(Self::parse::<RawTransfer>(value)?.normalize())
    }

    /// Sends several email transfers in one batch.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the batch is rejected as a whole.
    pub async fn send_batch(
        &self,
        tokens: &mut TokenStore,
        entries: &[(String, Decimal)],
    ) -> Result<Vec<Transfer>, ApiError> {
        let transfers: Vec<Value> = entries
            .iter()
            .map(|(email, amount)| json!({ "recipientEmail": email, "amount": amount }))
            .collect();
        let body = json!({ "transfers": transfers });
        let value = self
            .request(
                Method::POST,
                "/api/transfers/send-batch",
                None,
                Some(body),
                Some(tokens),
            )
            .await?;
        let raws: Vec<RawTransfer> = Self::parse_list(value)?;
        Ok(raws.into_iter().map(RawTransfer::normalize).collect())
    }

    /// Checks whether `email` can receive an email transfer.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] on deployments without this endpoint;
    /// callers are expected to fall back to [`Self::lookup_user`].
    pub async fn recipient_eligibility(
        &self,
        tokens: &mut TokenStore,
        email: &str,
    ) -> Result<bool, ApiError> {
        let query = [("email", email.to_string())];
        let value = self
            .request(
                Method::GET,
                "/api/transfers/eligibility",
                Some(&query),
                None,
                Some(tokens),
            )
            .await?;
        let response: EligibilityResponse = Self::parse(value)?;
        Ok(response.eligible)
    }

    /// Looks a user up by email; the fallback eligibility source.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] when the user or the endpoint does
    /// not exist.
    pub async fn lookup_user(
        &self,
        tokens: &mut TokenStore,
        email: &str,
    ) -> Result<UserLookup, ApiError> {
        let query = [("email", email.to_string())];
        let value = self
            .request(
                Method::GET,
                "/api/users/lookup",
                Some(&query),
                None,
                Some(tokens),
            )
            .await?;
        Self::parse(value)
    }

    // ─── Deposits ────────────────────────────────────────────────────────

    /// Creates a deposit of `amount` on the chain with id `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the deposit is rejected.
    pub async fn create_deposit(
        &self,
        tokens: &mut TokenStore,
        amount: Decimal,
        chain_id: u64,
    ) -> Result<Deposit, ApiError> {
        let body = json!({
            "amount": amount,
            "chainId": chain_id,
            "fundsSource": DEPOSIT_FUNDS_SOURCE
        });
        let value = self
            .request(
                Method::POST,
                "/api/deposits",
                None,
                Some(body),
                Some(tokens),
            )
            .await?;
        Ok(Self::parse::<RawDeposit>(value)?.normalize())
    }

    // ─── Notifications ───────────────────────────────────────────────────

    /// Signs a private-channel subscription for the notification socket.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the platform refuses to sign.
    pub async fn channel_auth(
        &self,
        tokens: &mut TokenStore,
        socket_id: &str,
        channel_name: &str,
    ) -> Result<String, ApiError> {
        let body = json!({ "socketId": socket_id, "channelName": channel_name });
        let value = self
            .request(
                Method::POST,
                "/api/notifications/auth",
                None,
                Some(body),
                Some(tokens),
            )
            .await?;
        let auth: types::ChannelAuth = Self::parse(value)?;
        Ok(auth.auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_statuses() {
        assert!(matches!(
            ApiClient::classify_error(StatusCode::UNAUTHORIZED, None, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiClient::classify_error(StatusCode::NOT_FOUND, None, ""),
            ApiError::NotFound
        ));
        assert!(matches!(
            ApiClient::classify_error(StatusCode::TOO_MANY_REQUESTS, Some(7), ""),
            ApiError::RateLimited {
                retry_after: Some(7)
            }
        ));
    }

    #[test]
    fn test_classify_error_formats_422() {
        let body = r#"{"message":[{"property":"amount","constraints":{"min":"too small"}}]}"#;
        match ApiClient::classify_error(StatusCode::UNPROCESSABLE_ENTITY, None, body) {
            ApiError::Validation(text) => assert_eq!(text, "amount: too small"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_error_hides_html_pages() {
        let body = "<!DOCTYPE html><html><body>502 Bad Gateway</body></html>";
        match ApiClient::classify_error(StatusCode::BAD_GATEWAY, None, body) {
            ApiError::Api { status, message } => {
                assert_eq!(status, 502);
                assert!(!message.contains("<html"));
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let timeout = ApiError::Timeout.user_message();
        let network = ApiError::Network("boom".to_string()).user_message();
        let unauthorized = ApiError::Unauthorized.user_message();
        assert_ne!(timeout, network);
        assert_ne!(network, unauthorized);
    }

    #[test]
    fn test_validation_user_message_is_html_escaped() {
        let err = ApiError::Validation("<script>alert(1)</script>".to_string());
        let message = err.user_message();
        assert!(!message.contains('<'));
    }
}
