use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use payout_bot::api::{ApiClient, ApiError};
use payout_bot::token::TokenStore;
use serde_json::{json, Value};

const STALE: &str = "stale-token";
const FRESH: &str = "fresh-token";
const REVOKED: &str = "revoked-token";

/// Stand-in for the payout platform: one accepted bearer, a refresh route
/// that can be switched off, and per-route call counters.
struct FakePlatform {
    refresh_ok: bool,
    refresh_calls: AtomicUsize,
    profile_calls: AtomicUsize,
}

impl FakePlatform {
    fn new(refresh_ok: bool) -> Arc<Self> {
        Arc::new(Self {
            refresh_ok,
            refresh_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
        })
    }
}

fn bearer_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

async fn refresh_handler(
    State(state): State<Arc<FakePlatform>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    if state.refresh_ok && bearer_of(&headers).is_some() {
        (
            StatusCode::OK,
            Json(json!({ "accessToken": FRESH, "expiresIn": 3600 })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "refresh rejected" })),
        )
    }
}

async fn profile_handler(
    State(state): State<Arc<FakePlatform>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.profile_calls.fetch_add(1, Ordering::SeqCst);
    if bearer_of(&headers).as_deref() == Some(FRESH) {
        (
            StatusCode::OK,
            Json(json!({
                "id": "user-1",
                "email": "pat@example.com",
                "organizationId": "org-9"
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "bad token" })),
        )
    }
}

async fn spawn_app(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_platform(state: Arc<FakePlatform>) -> SocketAddr {
    let app = Router::new()
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/users/me", get(profile_handler))
        .with_state(state);
    spawn_app(app).await
}

fn client_for(addr: SocketAddr) -> ApiClient {
    ApiClient::new(format!("http://{addr}"), Duration::from_secs(5))
}

#[tokio::test]
async fn stale_token_is_refreshed_before_the_call() {
    let platform = FakePlatform::new(true);
    let addr = spawn_platform(Arc::clone(&platform)).await;
    let api = client_for(addr);

    let mut tokens = TokenStore::new();
    // Zero TTL lands well inside the expiry buffer
    tokens.set(STALE, Some(0));

    let profile = api.profile(&mut tokens).await.unwrap();
    assert_eq!(profile.email, "pat@example.com");
    assert_eq!(profile.organization_id, "org-9");
    assert_eq!(tokens.token(), Some(FRESH));
    assert_eq!(platform.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(platform.profile_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mid_session_401_triggers_exactly_one_refresh_and_retry() {
    let platform = FakePlatform::new(true);
    let addr = spawn_platform(Arc::clone(&platform)).await;
    let api = client_for(addr);

    // Looks fresh locally, but the platform has already revoked it
    let mut tokens = TokenStore::new();
    tokens.set(REVOKED, Some(3600));

    let profile = api.profile(&mut tokens).await.unwrap();
    assert_eq!(profile.user_id, "user-1");
    assert_eq!(tokens.token(), Some(FRESH));
    assert_eq!(platform.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(platform.profile_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_refresh_after_401_clears_the_token() {
    let platform = FakePlatform::new(false);
    let addr = spawn_platform(Arc::clone(&platform)).await;
    let api = client_for(addr);

    let mut tokens = TokenStore::new();
    tokens.set(REVOKED, Some(3600));

    let result = api.profile(&mut tokens).await;
    let Err(err) = result else {
        panic!("expected an error with a revoked token and a dead refresh route");
    };
    assert!(matches!(err, ApiError::Unauthorized), "got {err:?}");
    assert!(tokens.token().is_none(), "token should be cleared");
    assert_eq!(platform.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(platform.profile_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_token_with_failing_refresh_proceeds_unauthenticated() {
    let platform = FakePlatform::new(false);
    let addr = spawn_platform(Arc::clone(&platform)).await;
    let api = client_for(addr);

    let mut tokens = TokenStore::new();
    tokens.set(STALE, Some(0));

    let result = api.profile(&mut tokens).await;
    let Err(err) = result else {
        panic!("expected an error once the pre-flight refresh failed");
    };
    assert!(matches!(err, ApiError::Unauthorized), "got {err:?}");
    assert!(tokens.token().is_none());
    // One pre-flight refresh, one bare call, no second refresh
    assert_eq!(platform.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(platform.profile_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_responses_surface_as_timeout() {
    async fn sleepy_handler() -> Json<Value> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Json(json!({}))
    }
    let app = Router::new().route("/api/users/me", get(sleepy_handler));
    let addr = spawn_app(app).await;
    let api = ApiClient::new(format!("http://{addr}"), Duration::from_millis(100));

    let mut tokens = TokenStore::new();
    tokens.set(FRESH, Some(3600));

    let result = api.profile(&mut tokens).await;
    let Err(err) = result else {
        panic!("expected a timeout");
    };
    assert!(matches!(err, ApiError::Timeout), "got {err:?}");
}

#[tokio::test]
async fn validation_errors_carry_field_messages() {
    async fn send_handler() -> (StatusCode, Json<Value>) {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": [
                    { "property": "amount", "constraints": { "min": "amount is too small" } }
                ]
            })),
        )
    }
    let app = Router::new().route("/api/transfers/send-email", post(send_handler));
    let addr = spawn_app(app).await;
    let api = client_for(addr);

    let mut tokens = TokenStore::new();
    tokens.set(FRESH, Some(3600));

    let result = api
        .send_by_email(&mut tokens, "pat@example.com", "5".parse().unwrap())
        .await;
    let message = match result {
        Err(ApiError::Validation(message)) => message,
        other => panic!("expected a validation error, got {other:?}"),
    };
    assert_eq!(message, "amount: amount is too small");
}
