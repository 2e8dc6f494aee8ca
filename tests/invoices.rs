//! Integration tests for invoices and spend validation against timesheets.

mod common;

use common::*;
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

/// Decimal fields serialize as strings; compare numerically.
fn dec(v: &serde_json::Value) -> f64 {
    v.as_str()
        .map(|s| s.parse().unwrap())
        .unwrap_or_else(|| v.as_f64().unwrap())
}

async fn create_rate_card(
    app: &TestApp,
    admin: &TestUser,
    vendor_id: Uuid,
    role_id: Uuid,
    rate: &str,
    currency: &str,
) {
    let response = app
        .post(
            "/api/rate-cards",
            &admin.access_token,
            json!({
                "vendor_id": vendor_id,
                "role_id": role_id,
                "hourly_rate": rate,
                "currency": currency,
                "effective_from": "2026-01-01"
            }),
        )
        .await;
    assert_status!(response, 201);
}

async fn log_hours(app: &TestApp, admin: &TestUser, member_id: Uuid, date: &str, hours: &str) {
    let response = app
        .post(
            "/api/timesheets",
            &admin.access_token,
            json!({
                "team_member_id": member_id,
                "work_date": date,
                "hours": hours
            }),
        )
        .await;
    assert_status!(response, 201);
}

async fn create_invoice(
    app: &TestApp,
    admin: &TestUser,
    vendor_id: Uuid,
    amount: &str,
    currency: &str,
) -> Uuid {
    let response = app
        .post(
            "/api/invoices",
            &admin.access_token,
            json!({
                "vendor_id": vendor_id,
                "invoice_number": TestApp::unique_name("INV"),
                "currency": currency,
                "amount": amount,
                "period_start": "2026-03-01",
                "period_end": "2026-03-31"
            }),
        )
        .await;
    assert_status!(response, 201);
    let body: serde_json::Value = response.json().await.unwrap();
    Uuid::parse_str(body["data"]["id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
#[serial]
async fn test_validation_matches_timesheet_spend() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;
    let (member_id, _) = app.create_team_member(&admin, vendor_id, role_id).await;

    create_rate_card(&app, &admin, vendor_id, role_id, "100", "EUR").await;
    log_hours(&app, &admin, member_id, "2026-03-02", "8").await;
    log_hours(&app, &admin, member_id, "2026-03-03", "8").await;
    log_hours(&app, &admin, member_id, "2026-03-04", "8").await;

    // 24h x 100 = 2400 expected; invoiced exactly that.
    let invoice_id = create_invoice(&app, &admin, vendor_id, "2400", "EUR").await;

    let response = app
        .post(
            &format!("/api/invoices/{}/validate", invoice_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(dec(&data["expected_amount"]), 2400.0);
    assert_eq!(dec(&data["discrepancy"]), 0.0);
    assert_eq!(data["within_tolerance"], true);
    assert_eq!(data["breakdown"].as_array().unwrap().len(), 1);
    assert_eq!(data["unrated_members"].as_array().unwrap().len(), 0);
}

#[tokio::test]
#[serial]
async fn test_tolerance_boundary_is_inclusive() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;
    let (member_id, _) = app.create_team_member(&admin, vendor_id, role_id).await;

    create_rate_card(&app, &admin, vendor_id, role_id, "100", "EUR").await;
    log_hours(&app, &admin, member_id, "2026-03-02", "10").await;

    // Expected 1000; invoiced 1050 is exactly at the default 5% threshold.
    let invoice_id = create_invoice(&app, &admin, vendor_id, "1050", "EUR").await;

    let response = app
        .post(
            &format!("/api/invoices/{}/validate", invoice_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["within_tolerance"], true);
    assert_eq!(dec(&body["data"]["discrepancy"]), 50.0);

    // A tighter per-request tolerance flips the result.
    let response = app
        .post(
            &format!("/api/invoices/{}/validate", invoice_id),
            &admin.access_token,
            json!({"tolerance_percent": "2"}),
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["within_tolerance"], false);
    assert_eq!(dec(&body["data"]["discrepancy_percent"]), 5.0);
}

#[tokio::test]
#[serial]
async fn test_unrated_members_are_reported() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;
    let (member_id, _) = app.create_team_member(&admin, vendor_id, role_id).await;

    // No rate card at all: hours show up as unrated, expected stays zero.
    log_hours(&app, &admin, member_id, "2026-03-02", "6").await;

    let invoice_id = create_invoice(&app, &admin, vendor_id, "0", "EUR").await;

    let response = app
        .post(
            &format!("/api/invoices/{}/validate", invoice_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(dec(&data["expected_amount"]), 0.0);
    assert_eq!(data["within_tolerance"], true);
    assert!(data["discrepancy_percent"].is_null());
    assert_eq!(data["unrated_members"].as_array().unwrap().len(), 1);
    assert_eq!(dec(&data["unrated_members"][0]["hours"]), 6.0);
}

#[tokio::test]
#[serial]
async fn test_missing_exchange_rate_rejected() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let role_id = app.create_role(&admin).await;
    let (member_id, _) = app.create_team_member(&admin, vendor_id, role_id).await;

    create_rate_card(&app, &admin, vendor_id, role_id, "100", "USD").await;
    log_hours(&app, &admin, member_id, "2026-03-02", "8").await;

    let invoice_id = create_invoice(&app, &admin, vendor_id, "800", "EUR").await;

    let response = app
        .post(
            &format!("/api/invoices/{}/validate", invoice_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MISSING_EXCHANGE_RATE");

    // Record a rate and the same validation converts the spend.
    let response = app
        .post(
            "/api/exchange-rates",
            &admin.access_token,
            json!({
                "base_currency": "USD",
                "quote_currency": "EUR",
                "rate": "0.9",
                "effective_on": "2026-03-01"
            }),
        )
        .await;
    assert_status!(response, 201);

    let response = app
        .post(
            &format!("/api/invoices/{}/validate", invoice_id),
            &admin.access_token,
            json!({}),
        )
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.unwrap();
    // 8h x 100 USD x 0.9 = 720 EUR expected against 800 invoiced.
    assert_eq!(dec(&body["data"]["expected_amount"]), 720.0);
    assert_eq!(body["data"]["within_tolerance"], false);
}

#[tokio::test]
#[serial]
async fn test_invoice_status_transitions() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let invoice_id = create_invoice(&app, &admin, vendor_id, "100", "EUR").await;

    // received -> paid is not allowed.
    let response = app
        .post(
            &format!("/api/invoices/{}/status", invoice_id),
            &admin.access_token,
            json!({"status": "paid"}),
        )
        .await;
    assert_status!(response, 409);

    let response = app
        .post(
            &format!("/api/invoices/{}/status", invoice_id),
            &admin.access_token,
            json!({"status": "validated"}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .post(
            &format!("/api/invoices/{}/status", invoice_id),
            &admin.access_token,
            json!({"status": "paid"}),
        )
        .await;
    assert_status!(response, 200);

    // Paid is terminal.
    let response = app
        .post(
            &format!("/api/invoices/{}/status", invoice_id),
            &admin.access_token,
            json!({"status": "disputed"}),
        )
        .await;
    assert_status!(response, 409);
}

#[tokio::test]
#[serial]
async fn test_invoice_not_editable_after_validation() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;
    let invoice_id = create_invoice(&app, &admin, vendor_id, "100", "EUR").await;

    let response = app
        .post(
            &format!("/api/invoices/{}/status", invoice_id),
            &admin.access_token,
            json!({"status": "validated"}),
        )
        .await;
    assert_status!(response, 200);

    let response = app
        .put(
            &format!("/api/invoices/{}", invoice_id),
            &admin.access_token,
            json!({"amount": "200"}),
        )
        .await;
    assert_status!(response, 409);
}

#[tokio::test]
#[serial]
async fn test_duplicate_invoice_number_conflict() {
    let app = TestApp::spawn().await;
    let admin = app.super_admin().await;
    let vendor_id = app.create_vendor(&admin).await;

    let number = TestApp::unique_name("INV");
    let payload = json!({
        "vendor_id": vendor_id,
        "invoice_number": number,
        "currency": "EUR",
        "amount": "100",
        "period_start": "2026-03-01",
        "period_end": "2026-03-31"
    });

    let response = app.post("/api/invoices", &admin.access_token, payload.clone()).await;
    assert_status!(response, 201);

    let response = app.post("/api/invoices", &admin.access_token, payload).await;
    assert_status!(response, 409);
}
