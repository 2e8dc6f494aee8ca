//! Integration tests for weekly delivery reports.

mod common;

use common::*;
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

async fn create_report(app: &TestApp, admin: &TestUser, vendor_id: Uuid) -> Uuid {
    let response = app
        .post(
            "/api/reports",
            &admin.access_token,
            json!({
                "vendor_id": vendor_id,
                "week_start": "2026-03-02",
                "rag_status": "green",
                "summary": "On track"
            }),
        )
        .await;
    assert_status!(response, 201);
    let body: serde_json::Value = response.json().await.unwrap();
    Uuid::parse_str(body["data"]["id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
#[serial]
async fn test_week_start_must_be_monday() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;

    let response = app
        .post(
            "/api/reports",
            &admin.access_token,
            json!({
                "vendor_id": vendor_id,
                "week_start": "2026-03-04",
                "rag_status": "green"
            }),
        )
        .await;
    assert_status!(response, 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_WEEK_START");
}

#[tokio::test]
#[serial]
async fn test_one_report_per_vendor_and_week() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;

    create_report(&app, &admin, vendor_id).await;

    let response = app
        .post(
            "/api/reports",
            &admin.access_token,
            json!({
                "vendor_id": vendor_id,
                "week_start": "2026-03-02",
                "rag_status": "amber"
            }),
        )
        .await;
    assert_status!(response, 409);
}

#[tokio::test]
#[serial]
async fn test_section_autosave_replaces_items() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let report_id = create_report(&app, &admin, vendor_id).await;

    let response = app
        .put(
            &format!("/api/reports/{}/sections/achievements", report_id),
            &admin.access_token,
            json!({"items": [
                {"description": "Completed UAT"},
                {"description": "Shipped release 2.4"}
            ]}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["achievements"].as_array().unwrap().len(), 2);

    // A second save replaces, not appends.
    let response = app
        .put(
            &format!("/api/reports/{}/sections/achievements", report_id),
            &admin.access_token,
            json!({"items": [{"description": "Only this one"}]}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let achievements = body["data"]["achievements"].as_array().unwrap();
    assert_eq!(achievements.len(), 1);
    assert_eq!(achievements[0]["description"], "Only this one");
}

#[tokio::test]
#[serial]
async fn test_all_sections_roundtrip() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let report_id = create_report(&app, &admin, vendor_id).await;

    let response = app
        .put(
            &format!("/api/reports/{}/sections/focus", report_id),
            &admin.access_token,
            json!({"items": [{"description": "Stabilise ingestion"}]}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .put(
            &format!("/api/reports/{}/sections/milestones", report_id),
            &admin.access_token,
            json!({"items": [
                {"title": "UAT sign-off", "due_on": "2026-03-20", "status": "on_track"},
                {"title": "Go-live", "due_on": "2026-04-01", "status": "at_risk"}
            ]}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .put(
            &format!("/api/reports/{}/sections/raid", report_id),
            &admin.access_token,
            json!({"items": [
                {"kind": "risk", "description": "Key engineer leaving", "severity": "high", "owner": "PM"}
            ]}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .put(
            &format!("/api/reports/{}/sections/resources", report_id),
            &admin.access_token,
            json!({"items": [
                {"role_name": "QA Engineer", "headcount": 2, "notes": null}
            ]}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .get(&format!("/api/reports/{}", report_id), &admin.access_token)
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(data["focus_items"].as_array().unwrap().len(), 1);
    assert_eq!(data["milestones"].as_array().unwrap().len(), 2);
    assert_eq!(data["milestones"][0]["title"], "UAT sign-off");
    assert_eq!(data["raid_items"].as_array().unwrap().len(), 1);
    assert_eq!(data["raid_items"][0]["kind"], "risk");
    assert_eq!(data["vendor_resources"].as_array().unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_unknown_section_and_bad_items_rejected() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let report_id = create_report(&app, &admin, vendor_id).await;

    let response = app
        .put(
            &format!("/api/reports/{}/sections/budget", report_id),
            &admin.access_token,
            json!({"items": []}),
        )
        .await;
    assert_status!(response, 400);

    let response = app
        .put(
            &format!("/api/reports/{}/sections/raid", report_id),
            &admin.access_token,
            json!({"items": [
                {"kind": "gossip", "description": "x", "severity": "high"}
            ]}),
        )
        .await;
    assert_status!(response, 400);
}

#[tokio::test]
#[serial]
async fn test_submit_freezes_report() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let report_id = create_report(&app, &admin, vendor_id).await;

    let response = app
        .post(
            &format!("/api/reports/{}/submit", report_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "submitted");
    assert!(body["data"]["submitted_at"].is_string());

    // No further edits of any kind.
    let response = app
        .put(
            &format!("/api/reports/{}", report_id),
            &admin.access_token,
            json!({"rag_status": "red"}),
        )
        .await;
    assert_status!(response, 409);

    let response = app
        .put(
            &format!("/api/reports/{}/sections/achievements", report_id),
            &admin.access_token,
            json!({"items": []}),
        )
        .await;
    assert_status!(response, 409);

    let response = app
        .post(
            &format!("/api/reports/{}/submit", report_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 409);
}

#[tokio::test]
#[serial]
async fn test_header_autosave_updates_rag() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let report_id = create_report(&app, &admin, vendor_id).await;

    let response = app
        .put(
            &format!("/api/reports/{}", report_id),
            &admin.access_token,
            json!({"rag_status": "amber", "summary": "Slipping"}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["rag_status"], "amber");
    assert_eq!(body["data"]["summary"], "Slipping");

    let response = app
        .put(
            &format!("/api/reports/{}", report_id),
            &admin.access_token,
            json!({"rag_status": "purple"}),
        )
        .await;
    assert_status!(response, 400);
}
