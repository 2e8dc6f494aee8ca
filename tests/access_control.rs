//! Integration tests for permission resolution and the access-control API.

mod common;

use common::*;
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_admin_bypasses_resource_grants() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    // No grants exist for this user, yet every resource is reachable.
    let response = app.get("/api/vendors", &admin.access_token).await;
    assert_status!(response, 200);

    let response = app.get("/api/invoices", &admin.access_token).await;
    assert_status!(response, 200);
}

#[tokio::test]
#[serial]
async fn test_view_user_needs_a_resource_grant() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let viewer = app.user_with_level("view").await;

    let response = app.get("/api/vendors", &viewer.access_token).await;
    assert_status!(response, 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "PERMISSION_DENIED");

    app.grant_resource(&admin, viewer.id, "vendors").await;

    let response = app.get("/api/vendors", &viewer.access_token).await;
    assert_status!(response, 200);
}

#[tokio::test]
#[serial]
async fn test_view_level_cannot_write_even_with_grant() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let viewer = app.user_with_level("view").await;

    app.grant_resource(&admin, viewer.id, "vendors").await;

    let name = TestApp::unique_name("vendor");
    let response = app
        .post(
            "/api/vendors",
            &viewer.access_token,
            json!({"name": name, "slug": name}),
        )
        .await;
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn test_denied_user_refused_despite_grants() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let denied = app.user_with_level("denied").await;

    // Grant everything; level denied must still win.
    for key in [
        "users",
        "vendors",
        "contracts",
        "invoices",
        "timesheets",
        "team_members",
        "roles",
        "rate_cards",
        "exchange_rates",
        "reports",
    ] {
        app.grant_resource(&admin, denied.id, key).await;
    }

    let response = app.get("/api/vendors", &denied.access_token).await;
    assert_status!(response, 403);

    let response = app.get("/api/invoices", &denied.access_token).await;
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn test_group_grant_extends_access() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let writer = app.user_with_level("write").await;

    let response = app
        .post(
            "/api/access/groups",
            &admin.access_token,
            json!({"name": TestApp::unique_name("group")}),
        )
        .await;
    assert_status!(response, 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let group_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .post(
            &format!("/api/access/groups/{}/members", group_id),
            &admin.access_token,
            json!({"user_id": writer.id}),
        )
        .await;
    assert_status!(response, 201);

    let response = app
        .post(
            "/api/access/permissions",
            &admin.access_token,
            json!({"resource_key": "roles", "group_id": group_id}),
        )
        .await;
    assert_status!(response, 201);

    // Access arrives through group membership alone.
    let response = app.get("/api/roles", &writer.access_token).await;
    assert_status!(response, 200);
}

#[tokio::test]
#[serial]
async fn test_check_endpoint_reports_reasons() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let viewer = app.user_with_level("view").await;

    let response = app
        .post(
            "/api/access/check",
            &admin.access_token,
            json!({"user_id": viewer.id, "resource": "invoices", "level": "view"}),
        )
        .await;
    assert_status!(response, 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["allowed"], false);
    assert_eq!(body["data"]["reason"], "resource_not_granted");

    let response = app
        .post(
            "/api/access/check",
            &admin.access_token,
            json!({"user_id": viewer.id, "resource": "invoices", "level": "write"}),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["reason"], "level_too_low");

    let response = app
        .post(
            "/api/access/check",
            &admin.access_token,
            json!({"user_id": admin.id, "resource": "invoices", "level": "admin"}),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["allowed"], true);
    assert_eq!(body["data"]["reason"], "super_user");
}

#[tokio::test]
#[serial]
async fn test_access_control_api_requires_admin() {
    let app = TestApp::spawn().await;
    let writer = app.user_with_level("write").await;

    let response = app
        .post(
            "/api/access/groups",
            &writer.access_token,
            json!({"name": TestApp::unique_name("group")}),
        )
        .await;
    assert_status!(response, 403);
}

#[tokio::test]
#[serial]
async fn test_grant_rejects_unknown_resource_and_bad_target() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let viewer = app.user_with_level("view").await;

    let response = app
        .post(
            "/api/access/permissions",
            &admin.access_token,
            json!({"resource_key": "payroll", "user_id": viewer.id}),
        )
        .await;
    assert_status!(response, 400);

    // Both user and group set at once.
    let response = app
        .post(
            "/api/access/permissions",
            &admin.access_token,
            json!({
                "resource_key": "invoices",
                "user_id": viewer.id,
                "group_id": viewer.id
            }),
        )
        .await;
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn test_effective_resources_lists_union() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let writer = app.user_with_level("write").await;

    app.grant_resource(&admin, writer.id, "vendors").await;
    app.grant_resource(&admin, writer.id, "contracts").await;

    let response = app
        .get(
            &format!("/api/access/users/{}/resources", writer.id),
            &admin.access_token,
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let resources: Vec<&str> = body["data"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(resources.contains(&"vendors"));
    assert!(resources.contains(&"contracts"));
    assert_eq!(body["data"]["permission_level"], "write");
}
