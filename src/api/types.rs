//! Wire types of the payout platform API and their normalized forms.
//!
//! The platform is inconsistent about field names and scalar encodings
//! (amounts arrive as strings or numbers, wallet addresses under three
//! different keys, lists under `data` or `items`). Raw DTOs are lenient
//! about all of that; each carries one `normalize` step so the rest of the
//! bot only ever sees the normalized records defined here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Converts a JSON scalar (string or number) into a [`Decimal`].
#[must_use]
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Server-issued one-time-code session, returned when a code is emailed out.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSession {
    /// Opaque id that must accompany the code on verification
    pub sid: String,
}

/// Token bundle returned by verification and refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    /// Bearer token for subsequent API calls
    pub access_token: String,
    /// Token lifetime in seconds; absent on some deployments
    #[serde(default)]
    pub expires_in: Option<i64>,
}

// ─── Profile / KYC ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct OrgRef {
    #[serde(default)]
    id: String,
}

/// Account profile as the API sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProfile {
    /// User id
    #[serde(default)]
    pub id: String,
    /// Sign-in email
    #[serde(default)]
    pub email: String,
    /// Organization id, when flattened onto the profile
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Organization relation, when nested
    #[serde(default)]
    organization: Option<OrgRef>,
    /// First name, if the platform has one on file
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name, if the platform has one on file
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Normalized account profile.
#[derive(Debug, Clone)]
pub struct Profile {
    /// User id
    pub user_id: String,
    /// Sign-in email
    pub email: String,
    /// Organization the account belongs to; scopes the notification channel
    pub organization_id: String,
    /// Display name assembled from first and last name
    pub name: Option<String>,
}

impl RawProfile {
    /// Collapses the two organization encodings into one id and joins the
    /// name parts.
    #[must_use]
    pub fn normalize(self) -> Profile {
        let organization_id = self
            .organization_id
            .filter(|s| !s.is_empty())
            .or(self.organization.map(|o| o.id))
            .unwrap_or_default();
        let name = match (self.first_name, self.last_name) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(f), None) => Some(f),
            (None, Some(l)) => Some(l),
            (None, None) => None,
        };
        Profile {
            user_id: self.id,
            email: self.email,
            organization_id,
            name,
        }
    }
}

/// Verification state of the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KycStatus {
    /// Verification passed; money movement is allowed
    Approved,
    /// Verification submitted and under review
    Pending,
    /// Verification declined
    Rejected,
    /// Any status string this bot does not know
    Other(String),
}

impl KycStatus {
    /// Parses the platform's status string, case-insensitively.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "approved" | "verified" => Self::Approved,
            "pending" | "in_review" | "submitted" => Self::Pending,
            "rejected" | "declined" => Self::Rejected,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether money movement is allowed in this state.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for KycStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Pending => write!(f, "pending"),
            Self::Rejected => write!(f, "rejected"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Shape of the KYC status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct KycResponse {
    /// Raw status string
    #[serde(default)]
    pub status: String,
}

// ─── Wallets ─────────────────────────────────────────────────────────────────

/// Wallet as the API sends it. The address may arrive under any of three
/// keys depending on the endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWallet {
    /// Wallet id
    #[serde(default)]
    pub id: String,
    /// Address under its usual key
    #[serde(default)]
    pub address: Option<String>,
    /// Address as some endpoints send it
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// Address as the wallet-generation endpoint sends it
    #[serde(default)]
    pub public_key: Option<String>,
    /// Network code
    #[serde(default)]
    pub network: Option<String>,
    /// Currency symbol
    #[serde(default)]
    pub currency: Option<String>,
    /// Balance, string or number
    #[serde(default)]
    pub balance: Option<Value>,
    /// Whether this wallet is the account default
    #[serde(default)]
    pub is_default: bool,
}

/// Normalized wallet record used across the bot.
#[derive(Debug, Clone)]
pub struct Wallet {
    /// Wallet id
    pub id: String,
    /// On-chain address; empty when the platform withheld it
    pub address: String,
    /// Network code
    pub network: String,
    /// Currency symbol
    pub currency: String,
    /// Current balance
    pub balance: Decimal,
    /// Whether this wallet is the account default
    pub is_default: bool,
}

impl RawWallet {
    /// Applies the address fallback chain and makes scalars concrete.
    #[must_use]
    pub fn normalize(self) -> Wallet {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        let address = non_empty(self.address)
            .or(non_empty(self.wallet_address))
            .or(non_empty(self.public_key))
            .unwrap_or_default();
        Wallet {
            id: self.id,
            address,
            network: self.network.unwrap_or_default(),
            currency: self.currency.unwrap_or_else(|| "USDC".to_string()),
            balance: self
                .balance
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO),
            is_default: self.is_default,
        }
    }
}

// ─── Transfers ───────────────────────────────────────────────────────────────

/// Transfer as the API sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransfer {
    /// Transfer id
    #[serde(default)]
    pub id: String,
    /// Amount, string or number
    #[serde(default)]
    pub amount: Option<Value>,
    /// Currency symbol under its usual key
    #[serde(default)]
    pub symbol: Option<String>,
    /// Currency symbol as some endpoints send it
    #[serde(default)]
    pub currency: Option<String>,
    /// Lifecycle status (pending, completed, failed, ...)
    #[serde(default)]
    pub status: Option<String>,
    /// Recipient under its usual key
    #[serde(default)]
    pub recipient: Option<String>,
    /// Recipient email for email transfers
    #[serde(default)]
    pub recipient_email: Option<String>,
    /// Recipient address for on-chain transfers
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// Network code for on-chain transfers
    #[serde(default)]
    pub network: Option<String>,
    /// Transaction hash under its usual key
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Transaction hash as some endpoints send it
    #[serde(default)]
    pub hash: Option<String>,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Normalized transfer record used across the bot.
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Transfer id
    pub id: String,
    /// Amount moved
    pub amount: Decimal,
    /// Currency symbol
    pub symbol: String,
    /// Lifecycle status
    pub status: String,
    /// Recipient email or address, when known
    pub recipient: Option<String>,
    /// Network code for on-chain transfers
    pub network: Option<String>,
    /// Transaction hash, when already mined
    pub tx_hash: Option<String>,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
}

impl RawTransfer {
    /// Collapses the field aliases and makes scalars concrete.
    #[must_use]
    pub fn normalize(self) -> Transfer {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Transfer {
            id: self.id,
            amount: self
                .amount
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO),
            symbol: non_empty(self.symbol)
                .or(non_empty(self.currency))
                .unwrap_or_else(|| "USDC".to_string()),
            status: self.status.unwrap_or_else(|| "unknown".to_string()),
            recipient: non_empty(self.recipient)
                .or(non_empty(self.recipient_email))
                .or(non_empty(self.wallet_address)),
            network: non_empty(self.network),
            tx_hash: non_empty(self.tx_hash).or(non_empty(self.hash)),
            created_at: self.created_at,
        }
    }
}

/// Fee quote for a pending transfer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFee {
    /// Fee, string or number
    #[serde(default)]
    pub fee: Option<Value>,
    /// Currency the fee is charged in
    #[serde(default)]
    pub currency: Option<String>,
    /// Total including fee, string or number
    #[serde(default)]
    pub total: Option<Value>,
}

/// Normalized fee quote.
#[derive(Debug, Clone)]
pub struct FeeInfo {
    /// Fee amount
    pub fee: Decimal,
    /// Currency the fee is charged in
    pub currency: String,
    /// Total including fee, when the API reports one
    pub total: Option<Decimal>,
}

impl RawFee {
    /// Makes the fee scalars concrete.
    #[must_use]
    pub fn normalize(self) -> FeeInfo {
        FeeInfo {
            fee: self
                .fee
                .as_ref()
                .and_then(decimal_from_value)
                .unwrap_or(Decimal::ZERO),
            currency: self.currency.unwrap_or_else(|| "USDC".to_string()),
            total: self.total.as_ref().and_then(decimal_from_value),
        }
    }
}

// ─── Deposits ────────────────────────────────────────────────────────────────

/// Deposit as the API sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeposit {
    /// Deposit id
    #[serde(default)]
    pub id: String,
    /// Hosted payment page, when the platform provides one
    #[serde(default)]
    pub payment_link: Option<String>,
    /// Address to send funds to, under its usual key
    #[serde(default)]
    pub deposit_address: Option<String>,
    /// Address to send funds to, as some endpoints send it
    #[serde(default)]
    pub address: Option<String>,
    /// Network code
    #[serde(default)]
    pub network: Option<String>,
    /// Amount, string or number
    #[serde(default)]
    pub amount: Option<Value>,
}

/// Normalized deposit record.
#[derive(Debug, Clone)]
pub struct Deposit {
    /// Deposit id
    pub id: String,
    /// Hosted payment page, when available
    pub payment_link: Option<String>,
    /// Address to send funds to, when available
    pub deposit_address: Option<String>,
    /// Network code
    pub network: Option<String>,
    /// Requested amount
    pub amount: Option<Decimal>,
}

impl RawDeposit {
    /// Collapses the address aliases and makes scalars concrete.
    #[must_use]
    pub fn normalize(self) -> Deposit {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Deposit {
            id: self.id,
            payment_link: non_empty(self.payment_link),
            deposit_address: non_empty(self.deposit_address).or(non_empty(self.address)),
            network: non_empty(self.network),
            amount: self.amount.as_ref().and_then(decimal_from_value),
        }
    }
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// Paged list envelope as the API sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct RawPage<T> {
    /// Items under their usual key
    #[serde(default)]
    pub data: Option<Vec<T>>,
    /// Items as some endpoints send them
    #[serde(default)]
    pub items: Option<Vec<T>>,
    /// Page number, 1-based
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size
    #[serde(default)]
    pub limit: Option<u32>,
    /// Total item count
    #[serde(default)]
    pub total: Option<u64>,
    /// Total page count, when the API computes it
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Normalized page of items.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Page number, 1-based
    pub page: u32,
    /// Page size
    pub limit: u32,
    /// Total page count, at least 1
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Maps the items, keeping the paging counters.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

impl<T> RawPage<T> {
    /// Collapses the envelope aliases; missing counters fall back to the
    /// values the caller requested.
    #[must_use]
    pub fn normalize(self, requested_page: u32, requested_limit: u32) -> Page<T> {
        let items = self.data.or(self.items).unwrap_or_default();
        let limit = self.limit.unwrap_or(requested_limit).max(1);
        let total_pages = self
            .total_pages
            .or_else(|| {
                self.total.map(|total| {
                    u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX)
                })
            })
            .unwrap_or(1)
            .max(1);
        Page {
            items,
            page: self.page.unwrap_or(requested_page).max(1),
            limit,
            total_pages,
        }
    }
}

// ─── Misc lookups ────────────────────────────────────────────────────────────

/// Recipient eligibility verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct EligibilityResponse {
    /// Whether the recipient can receive an email transfer
    #[serde(default, alias = "isEligible")]
    pub eligible: bool,
}

/// Minimal user record from the lookup-by-email endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLookup {
    /// Whether the user has at least one wallet
    #[serde(default)]
    pub has_wallets: bool,
    /// Whether the user's verification passed
    #[serde(default)]
    pub kyc_approved: bool,
}

/// Signature for subscribing to a private notification channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelAuth {
    /// `key:signature` string the websocket expects
    pub auth: String,
}

// ─── Validation error payloads ───────────────────────────────────────────────

/// Formats a structured 422 payload into `field: constraint` lines.
///
/// Understands the usual shapes: a plain string message, an array of string
/// messages, and an array of per-field objects carrying a `constraints` map.
#[must_use]
pub fn format_validation_errors(body: &Value) -> Option<String> {
    let message = body.get("message").or_else(|| body.get("errors"))?;
    match message {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(entries) => {
            let mut lines = Vec::new();
            for entry in entries {
                match entry {
                    Value::String(s) => lines.push(s.clone()),
                    Value::Object(_) => {
                        let property = entry
                            .get("property")
                            .and_then(Value::as_str)
                            .unwrap_or("field");
                        if let Some(constraints) =
                            entry.get("constraints").and_then(Value::as_object)
                        {
                            for constraint in constraints.values() {
                                if let Some(text) = constraint.as_str() {
                                    lines.push(format!("{property}: {text}"));
                                }
                            }
                        } else {
                            lines.push(property.to_string());
                        }
                    }
                    _ => {}
                }
            }
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wallet_address_fallback_chain() {
        let raw: RawWallet = serde_json::from_value(json!({
            "id": "w1",
            "walletAddress": "0xAAA",
            "balance": "12.5"
        }))
        .unwrap();
        let wallet = raw.normalize();
        assert_eq!(wallet.address, "0xAAA");
        assert_eq!(wallet.balance, "12.5".parse().unwrap());

        let raw: RawWallet = serde_json::from_value(json!({
            "id": "w2",
            "address": "",
            "publicKey": "0xBBB"
        }))
        .unwrap();
        let wallet = raw.normalize();
        assert_eq!(wallet.address, "0xBBB");
        assert_eq!(wallet.balance, Decimal::ZERO);
    }

    #[test]
    fn test_wallet_balance_accepts_number_and_string() {
        let as_number: RawWallet =
            serde_json::from_value(json!({"id": "w", "balance": 7.25})).unwrap();
        let as_string: RawWallet =
            serde_json::from_value(json!({"id": "w", "balance": "7.25"})).unwrap();
        assert_eq!(as_number.normalize().balance, as_string.normalize().balance);
    }

    #[test]
    fn test_transfer_normalization() {
        let raw: RawTransfer = serde_json::from_value(json!({
            "id": "t1",
            "amount": "100.50",
            "currency": "USDC",
            "status": "completed",
            "recipientEmail": "dest@example.com",
            "hash": "0xdeadbeef",
            "createdAt": "2025-05-01T10:00:00Z"
        }))
        .unwrap();
        let transfer = raw.normalize();
        assert_eq!(transfer.amount, "100.50".parse().unwrap());
        assert_eq!(transfer.symbol, "USDC");
        assert_eq!(transfer.recipient.as_deref(), Some("dest@example.com"));
        assert_eq!(transfer.tx_hash.as_deref(), Some("0xdeadbeef"));
        assert!(transfer.created_at.is_some());
    }

    #[test]
    fn test_page_envelope_aliases() {
        let with_data: RawPage<RawTransfer> = serde_json::from_value(json!({
            "data": [{"id": "a"}],
            "page": 2,
            "limit": 5,
            "totalPages": 4
        }))
        .unwrap();
        let page = with_data.normalize(1, 5);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 4);

        let with_items: RawPage<RawTransfer> = serde_json::from_value(json!({
            "items": [{"id": "a"}, {"id": "b"}],
            "total": 11
        }))
        .unwrap();
        let page = with_items.normalize(1, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.limit, 5);
        // ceil(11 / 5) = 3
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_page_envelope_empty_defaults() {
        let raw: RawPage<RawTransfer> = serde_json::from_value(json!({})).unwrap();
        let page = raw.normalize(3, 5);
        assert!(page.items.is_empty());
        assert_eq!(page.page, 3);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_profile_organization_fallback() {
        let nested: RawProfile = serde_json::from_value(json!({
            "id": "u1",
            "email": "me@example.com",
            "organization": {"id": "org-9"},
            "firstName": "Ada",
            "lastName": "Lovelace"
        }))
        .unwrap();
        let profile = nested.normalize();
        assert_eq!(profile.organization_id, "org-9");
        assert_eq!(profile.name.as_deref(), Some("Ada Lovelace"));

        let flat: RawProfile = serde_json::from_value(json!({
            "id": "u2",
            "email": "me@example.com",
            "organizationId": "org-3"
        }))
        .unwrap();
        assert_eq!(flat.normalize().organization_id, "org-3");
    }

    #[test]
    fn test_kyc_status_parsing() {
        assert!(KycStatus::parse("Approved").is_approved());
        assert!(KycStatus::parse("VERIFIED").is_approved());
        assert_eq!(KycStatus::parse("pending"), KycStatus::Pending);
        assert_eq!(KycStatus::parse("declined"), KycStatus::Rejected);
        assert_eq!(
            KycStatus::parse("weird"),
            KycStatus::Other("weird".to_string())
        );
    }

    #[test]
    fn test_format_validation_errors_field_objects() {
        let body = json!({
            "message": [
                {
                    "property": "amount",
                    "constraints": {"min": "amount must not be less than 1"}
                },
                {
                    "property": "recipientEmail",
                    "constraints": {"isEmail": "recipientEmail must be an email"}
                }
            ]
        });
        let text = format_validation_errors(&body).unwrap();
        assert!(text.contains("amount: amount must not be less than 1"));
        assert!(text.contains("recipientEmail: recipientEmail must be an email"));
    }

    #[test]
    fn test_format_validation_errors_string_shapes() {
        let body = json!({"message": ["first problem", "second problem"]});
        assert_eq!(
            format_validation_errors(&body).unwrap(),
            "first problem\nsecond problem"
        );

        let body = json!({"message": "just one problem"});
        assert_eq!(
            format_validation_errors(&body).unwrap(),
            "just one problem"
        );

        let body = json!({"unrelated": true});
        assert!(format_validation_errors(&body).is_none());
    }

    #[test]
    fn test_decimal_from_value() {
        assert_eq!(decimal_from_value(&json!("1.5")), "1.5".parse().ok());
        assert_eq!(decimal_from_value(&json!(2)), Some(Decimal::from(2)));
        assert_eq!(decimal_from_value(&json!(null)), None);
        assert_eq!(decimal_from_value(&json!("abc")), None);
    }
}
