//! Tiny HTTP health endpoint for container orchestration.
//!
//! The bot itself talks to Telegram over long polling, so this server is
//! the only listening socket in the process. It answers liveness probes
//! and nothing else.

use std::io;
use std::net::SocketAddr;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Body returned by the health routes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Fixed "ok" marker probes look for.
    pub status: &'static str,
    /// Human-readable liveness line, useful when several bots share a host.
    pub message: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: concat!("payout-bot ", env!("CARGO_PKG_VERSION"), " is running"),
    })
}

/// Starts the health server on `addr` and returns the bound address plus a
/// shutdown handle.
///
/// Binding to port 0 picks a free port; the returned `SocketAddr` carries
/// the real one. Dropping or firing the returned sender drains the server
/// gracefully.
///
/// # Errors
///
/// Returns the underlying I/O error when the address cannot be bound.
pub async fn start(addr: SocketAddr) -> io::Result<(SocketAddr, oneshot::Sender<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;

    let app = Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler));

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async {
            // Err means the sender was dropped; shut down either way.
            let _ = shutdown_rx.await;
            info!("Health server shutting down");
        });
        if let Err(err) = serve.await {
            error!("Health server error: {err}");
        }
    });

    info!("Health server listening on {bound}");
    Ok((bound, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_body_serializes() {
        let body = HealthResponse {
            status: "ok",
            message: "payout-bot 0.0.0 is running",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"message\":\"payout-bot 0.0.0 is running\""));
    }
}
