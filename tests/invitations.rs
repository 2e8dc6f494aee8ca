//! Integration tests for the invitation and password-reset token flows.

mod common;

use common::*;
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_invite_accept_and_login() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let email = TestApp::unique_email();
    let response = app
        .post(
            "/api/users/invite",
            &admin.access_token,
            json!({"email": email, "full_name": "Dana Petrov", "permission_level": "view"}),
        )
        .await;
    assert_status!(response, 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["user"]["status"], "invited");
    let invitation_token = body["data"]["invitation_token"].as_str().unwrap().to_string();
    let url_token = body["data"]["url_token"].as_str().unwrap().to_string();

    // Invited users cannot log in yet.
    let response = app
        .post_public(
            "/api/auth/login",
            json!({"email": email, "password": "newPassword123"}),
        )
        .await;
    assert_status!(response, 401);

    let response = app
        .post_public(
            "/api/auth/accept-invitation",
            json!({
                "url_token": url_token,
                "token": invitation_token,
                "password": "newPassword123"
            }),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["user"]["status"], "active");
    assert!(body["data"]["access_token"].is_string());

    // And now login works with the chosen password.
    let user = app.login(&email, "newPassword123").await;
    assert_eq!(user.email, email);
}

#[tokio::test]
#[serial]
async fn test_invitation_tokens_are_single_use() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let email = TestApp::unique_email();
    let response = app
        .post(
            "/api/users/invite",
            &admin.access_token,
            json!({"email": email, "permission_level": "view"}),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let invitation_token = body["data"]["invitation_token"].as_str().unwrap().to_string();
    let url_token = body["data"]["url_token"].as_str().unwrap().to_string();

    let payload = json!({
        "url_token": url_token,
        "token": invitation_token,
        "password": "newPassword123"
    });

    let response = app
        .post_public("/api/auth/accept-invitation", payload.clone())
        .await;
    assert_status!(response, 200);

    let response = app.post_public("/api/auth/accept-invitation", payload).await;
    assert_status!(response, 409);
}

#[tokio::test]
#[serial]
async fn test_tampered_url_token_rejected() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let email = TestApp::unique_email();
    let response = app
        .post(
            "/api/users/invite",
            &admin.access_token,
            json!({"email": email, "permission_level": "view"}),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let invitation_token = body["data"]["invitation_token"].as_str().unwrap().to_string();

    let response = app
        .post_public(
            "/api/auth/accept-invitation",
            json!({
                "url_token": "not.a.token",
                "token": invitation_token,
                "password": "newPassword123"
            }),
        )
        .await;
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn test_revoked_invitation_cannot_be_accepted() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let email = TestApp::unique_email();
    let response = app
        .post(
            "/api/users/invite",
            &admin.access_token,
            json!({"email": email, "permission_level": "view"}),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();
    let invitation_token = body["data"]["invitation_token"].as_str().unwrap().to_string();
    let url_token = body["data"]["url_token"].as_str().unwrap().to_string();

    let response = app
        .post(
            &format!("/api/users/{}/revoke-invitation", user_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 204);

    let response = app
        .post_public(
            "/api/auth/accept-invitation",
            json!({
                "url_token": url_token,
                "token": invitation_token,
                "password": "newPassword123"
            }),
        )
        .await;
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn test_invitation_audit_trail() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let email = TestApp::unique_email();
    let response = app
        .post(
            "/api/users/invite",
            &admin.access_token,
            json!({"email": email, "permission_level": "view"}),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();
    let invitation_token = body["data"]["invitation_token"].as_str().unwrap().to_string();
    let url_token = body["data"]["url_token"].as_str().unwrap().to_string();

    let response = app
        .post_public(
            "/api/auth/accept-invitation",
            json!({
                "url_token": url_token,
                "token": invitation_token,
                "password": "newPassword123"
            }),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .get(&format!("/api/users/{}/audit", user_id), &admin.access_token)
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let actions: Vec<&str> = body["data"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"invited"));
    assert!(actions.contains(&"accepted"));
}

#[tokio::test]
#[serial]
async fn test_forgot_password_does_not_enumerate_accounts() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/api/auth/forgot-password",
            json!({"email": "nobody@example.com"}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(body["data"]["reset_token"].is_null());
}

#[tokio::test]
#[serial]
async fn test_password_reset_flow() {
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.seed_user(&email, "oldPassword123", "view", false);

    let response = app
        .post_public("/api/auth/forgot-password", json!({"email": email}))
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let reset_token = body["data"]["reset_token"].as_str().unwrap().to_string();
    let url_token = body["data"]["url_token"].as_str().unwrap().to_string();

    let response = app
        .post_public(
            "/api/auth/reset-password",
            json!({
                "url_token": url_token,
                "token": reset_token,
                "password": "brandNewPassword1"
            }),
        )
        .await;
    assert_status!(response, 200);

    // Old password refused, new one accepted.
    let response = app
        .post_public(
            "/api/auth/login",
            json!({"email": email, "password": "oldPassword123"}),
        )
        .await;
    assert_status!(response, 401);

    let user = app.login(&email, "brandNewPassword1").await;
    assert_eq!(user.email, email);
}

#[tokio::test]
#[serial]
async fn test_reset_token_is_single_use() {
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.seed_user(&email, "oldPassword123", "view", false);

    let response = app
        .post_public("/api/auth/forgot-password", json!({"email": email}))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let reset_token = body["data"]["reset_token"].as_str().unwrap().to_string();
    let url_token = body["data"]["url_token"].as_str().unwrap().to_string();

    let payload = json!({
        "url_token": url_token,
        "token": reset_token,
        "password": "brandNewPassword1"
    });

    let response = app
        .post_public("/api/auth/reset-password", payload.clone())
        .await;
    assert_status!(response, 200);

    let response = app.post_public("/api/auth/reset-password", payload).await;
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn test_invite_requires_admin_level() {
    let app = TestApp::spawn().await;
    let writer = app.user_with_level("write").await;

    let response = app
        .post(
            "/api/users/invite",
            &writer.access_token,
            json!({"email": TestApp::unique_email(), "permission_level": "view"}),
        )
        .await;
    assert_status!(response, 403);
}
