use std::net::SocketAddr;
use std::time::Duration;

use payout_bot::server;
use serde_json::Value;

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (addr, _shutdown) = server::start(loopback()).await.unwrap();

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("payout-bot"));
    assert!(message.contains(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
async fn root_serves_the_same_probe() {
    let (addr, _shutdown) = server::start(loopback()).await.unwrap();

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn shutdown_signal_stops_the_listener() {
    let (addr, shutdown) = server::start(loopback()).await.unwrap();

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    shutdown.send(()).unwrap();

    // Shutdown is asynchronous; give the listener a moment to close
    let mut refused = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if reqwest::get(format!("http://{addr}/health")).await.is_err() {
            refused = true;
            break;
        }
    }
    assert!(refused, "health endpoint still answering after shutdown");
}
