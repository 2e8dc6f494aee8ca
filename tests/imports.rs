//! Integration tests for the timesheet CSV bulk import.

mod common;

use common::*;
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_import_with_fuzzy_headers() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;
    let (member_id, email) = app.create_team_member(&admin, vendor_id, role_id).await;

    let csv = format!(
        "Employee_Email,Work-Date,HRS,Comments\n\
         {email},2026-03-02,7.5,sprint work\n\
         {email},03/03/2026,8,\n"
    );

    let response = app
        .post_csv("/api/imports/timesheets", &admin.access_token, &csv)
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["imported"], 2);
    assert_eq!(body["data"]["skipped_duplicates"], 0);
    assert_eq!(body["data"]["errors"].as_array().unwrap().len(), 0);

    let response = app
        .get(
            &format!("/api/timesheets?team_member_id={}", member_id),
            &admin.access_token,
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["pagination"]["total_count"], 2);
}

#[tokio::test]
#[serial]
async fn test_import_skips_duplicates_in_file_and_database() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;
    let (member_id, email) = app.create_team_member(&admin, vendor_id, role_id).await;

    // Existing entry in the database for 2026-03-02.
    let response = app
        .post(
            "/api/timesheets",
            &admin.access_token,
            json!({
                "team_member_id": member_id,
                "work_date": "2026-03-02",
                "hours": "8"
            }),
        )
        .await;
    assert_status!(response, 201);

    let csv = format!(
        "member,date,hours\n\
         {email},2026-03-02,6\n\
         {email},2026-03-03,6\n\
         {email},2026-03-03,4\n"
    );

    let response = app
        .post_csv("/api/imports/timesheets", &admin.access_token, &csv)
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    // Only 2026-03-03 lands; the in-file repeat and the DB clash are skipped.
    assert_eq!(body["data"]["imported"], 1);
    assert_eq!(body["data"]["skipped_duplicates"], 2);
}

#[tokio::test]
#[serial]
async fn test_import_reports_row_errors() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;
    let (_, email) = app.create_team_member(&admin, vendor_id, role_id).await;

    let csv = format!(
        "member,date,hours\n\
         {email},2026-03-02,7.5\n\
         ghost@nowhere.example,2026-03-02,8\n\
         {email},not-a-date,8\n\
         {email},2026-03-04,99\n"
    );

    let response = app
        .post_csv("/api/imports/timesheets", &admin.access_token, &csv)
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["imported"], 1);

    let errors = body["data"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 3);
    assert!(errors
        .iter()
        .any(|e| e["message"].as_str().unwrap().contains("no team member")));
    assert!(errors
        .iter()
        .any(|e| e["message"].as_str().unwrap().contains("date")));
    assert!(errors
        .iter()
        .any(|e| e["message"].as_str().unwrap().contains("hours")));
}

#[tokio::test]
#[serial]
async fn test_import_rejects_unmappable_headers() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let response = app
        .post_csv(
            "/api/imports/timesheets",
            &admin.access_token,
            "who,when\nsomeone,sometime\n",
        )
        .await;
    assert_status!(response, 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "UNMAPPABLE_HEADERS");
}

#[tokio::test]
#[serial]
async fn test_import_rejects_empty_file() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let response = app
        .post_csv("/api/imports/timesheets", &admin.access_token, "  \n")
        .await;
    assert_status!(response, 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "EMPTY_FILE");
}

#[tokio::test]
#[serial]
async fn test_import_requires_write_access() {
    let app = TestApp::spawn().await;
    let viewer = app.user_with_level("view").await;

    let response = app
        .post_csv(
            "/api/imports/timesheets",
            &viewer.access_token,
            "member,date,hours\n",
        )
        .await;
    assert_status!(response, 403);
}
