//! Integration tests for health endpoints and the response envelope.

mod common;

use common::*;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_simple_health_check() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health").await;
    assert_status!(response, 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
#[serial]
async fn test_health_status_reports_service() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/status").await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "cadence");
}

#[tokio::test]
#[serial]
async fn test_liveness_and_readiness() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/health/live").await;
    assert_status!(response, 200);

    let response = app.get_public("/health/ready").await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["database"]["status"], "up");
}

#[tokio::test]
#[serial]
async fn test_unknown_route_returns_envelope_error() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/api/nope").await;
    assert_status!(response, 404);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
#[serial]
async fn test_protected_route_requires_token() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/api/vendors").await;
    assert_status!(response, 401);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "MISSING_AUTH_HEADER");
}
