//! Integration tests for team member assignments.

mod common;

use common::*;
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_create_team_member() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;

    let (member_id, email) = app.create_team_member(&admin, vendor_id, role_id).await;

    let response = app
        .get(&format!("/api/team-members/{}", member_id), &admin.access_token)
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["email"], email);
    assert_eq!(body["data"]["status"], "active");
}

#[tokio::test]
#[serial]
async fn test_assignment_to_inactive_vendor_rejected() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;

    let response = app
        .put(
            &format!("/api/vendors/{}", vendor_id),
            &admin.access_token,
            json!({"status": "inactive"}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .post(
            "/api/team-members",
            &admin.access_token,
            json!({
                "vendor_id": vendor_id,
                "role_id": role_id,
                "display_name": "Dana Petrov",
                "email": TestApp::unique_email(),
                "starts_on": "2026-01-01"
            }),
        )
        .await;
    assert_status!(response, 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VENDOR_INACTIVE");
}

#[tokio::test]
#[serial]
async fn test_assignment_of_inactive_user_rejected() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;

    let target = app.user_with_level("view").await;
    let response = app
        .put(
            &format!("/api/users/{}", target.id),
            &admin.access_token,
            json!({"status": "inactive"}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .post(
            "/api/team-members",
            &admin.access_token,
            json!({
                "user_id": target.id,
                "vendor_id": vendor_id,
                "role_id": role_id,
                "display_name": "Dana Petrov",
                "email": TestApp::unique_email(),
                "starts_on": "2026-01-01"
            }),
        )
        .await;
    assert_status!(response, 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "USER_INACTIVE");
}

#[tokio::test]
#[serial]
async fn test_reactivation_rechecks_vendor() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;
    let (member_id, _) = app.create_team_member(&admin, vendor_id, role_id).await;

    // Deactivate the member, then the vendor.
    let response = app
        .put(
            &format!("/api/team-members/{}", member_id),
            &admin.access_token,
            json!({"status": "inactive"}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .put(
            &format!("/api/vendors/{}", vendor_id),
            &admin.access_token,
            json!({"status": "inactive"}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .put(
            &format!("/api/team-members/{}", member_id),
            &admin.access_token,
            json!({"status": "active"}),
        )
        .await;
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn test_list_filters_by_vendor() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_a = app.create_vendor(&admin).await;
    let vendor_b = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;

    app.create_team_member(&admin, vendor_a, role_id).await;
    app.create_team_member(&admin, vendor_a, role_id).await;
    app.create_team_member(&admin, vendor_b, role_id).await;

    let response = app
        .get(
            &format!("/api/team-members?vendor_id={}", vendor_a),
            &admin.access_token,
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["pagination"]["total_count"], 2);
}
