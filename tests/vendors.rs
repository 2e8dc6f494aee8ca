//! Integration tests for vendors, tags, and contracts.

mod common;

use common::*;
use serde_json::json;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_vendor_crud_roundtrip() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let name = TestApp::unique_name("vendor");
    let response = app
        .post(
            "/api/vendors",
            &admin.access_token,
            json!({
                "name": name,
                "slug": name,
                "contact_name": "Sam Lee",
                "contact_email": "sam@acme.example",
                "country": "NL"
            }),
        )
        .await;
    assert_status!(response, 201);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    let vendor_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "active");

    let response = app
        .put(
            &format!("/api/vendors/{}", vendor_id),
            &admin.access_token,
            json!({"country": "DE"}),
        )
        .await;
    assert_status!(response, 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["country"], "DE");

    let response = app
        .get(&format!("/api/vendors/{}", vendor_id), &admin.access_token)
        .await;
    assert_status!(response, 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["name"], name);
}

#[tokio::test]
#[serial]
async fn test_duplicate_vendor_slug_conflict() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;

    let name = TestApp::unique_name("vendor");
    let payload = json!({"name": name, "slug": name});

    let response = app.post("/api/vendors", &admin.access_token, payload.clone()).await;
    assert_status!(response, 201);

    let response = app.post("/api/vendors", &admin.access_token, payload).await;
    assert_status!(response, 409);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VENDOR_EXISTS");
}

#[tokio::test]
#[serial]
async fn test_vendor_tags_are_replaced_not_appended() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;

    let response = app
        .put(
            &format!("/api/vendors/{}/tags", vendor_id),
            &admin.access_token,
            json!({"tags": ["Offshore", "strategic", "offshore"]}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let tags = body["data"]["tags"].as_array().unwrap();
    // Normalized and deduplicated.
    assert_eq!(tags.len(), 2);

    let response = app
        .put(
            &format!("/api/vendors/{}/tags", vendor_id),
            &admin.access_token,
            json!({"tags": ["strategic"]}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .get(&format!("/api/vendors/{}", vendor_id), &admin.access_token)
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    let tags = body["data"]["tags"].as_array().unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0], "strategic");
}

#[tokio::test]
#[serial]
async fn test_vendor_list_filters_by_status() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;

    let response = app
        .put(
            &format!("/api/vendors/{}", vendor_id),
            &admin.access_token,
            json!({"status": "inactive"}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .get("/api/vendors?status=inactive", &admin.access_token)
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let rows = body["data"]["data"].as_array().unwrap();
    assert!(rows.iter().any(|v| v["id"] == vendor_id.to_string()));
    assert!(rows.iter().all(|v| v["status"] == "inactive"));
}

#[tokio::test]
#[serial]
async fn test_contract_lifecycle() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;

    let response = app
        .post(
            "/api/contracts",
            &admin.access_token,
            json!({
                "vendor_id": vendor_id,
                "title": "Platform delivery 2026",
                "reference": TestApp::unique_name("CTR"),
                "starts_on": "2026-01-01",
                "ends_on": "2026-12-31",
                "value": "250000.00",
                "currency": "eur"
            }),
        )
        .await;
    assert_status!(response, 201);

    let body: serde_json::Value = response.json().await.unwrap();
    let contract_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "draft");
    assert_eq!(body["data"]["currency"], "EUR");

    let response = app
        .put(
            &format!("/api/contracts/{}", contract_id),
            &admin.access_token,
            json!({"status": "active"}),
        )
        .await;
    assert_status!(response, 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "active");
}

#[tokio::test]
#[serial]
async fn test_contract_date_range_validated() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;

    let response = app
        .post(
            "/api/contracts",
            &admin.access_token,
            json!({
                "vendor_id": vendor_id,
                "title": "Backwards",
                "reference": TestApp::unique_name("CTR"),
                "starts_on": "2026-06-01",
                "ends_on": "2026-01-01",
                "value": "1000",
                "currency": "EUR"
            }),
        )
        .await;
    assert_status!(response, 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_DATE_RANGE");
}
