//! Invoice handlers: CRUD, status transitions, and spend validation
//! against timesheets.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    billing::{
        fx,
        spend::{self, SpendLine, SpendValidation, UnratedMember},
    },
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{Invoice, NewInvoice, RateCard},
    pagination::{PaginationMeta, PaginationParams},
    schema::{invoices, rate_cards, team_members, timesheet_entries, vendors},
    telemetry::record_invoice_validation,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    pub vendor_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "Invoice number must be 1-100 characters"))]
    #[schema(example = "INV-2026-0192")]
    pub invoice_number: String,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    #[schema(example = "EUR")]
    pub currency: String,
    #[schema(value_type = String, example = "41250.00")]
    pub amount: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateInvoiceRequest {
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InvoiceStatusRequest {
    #[schema(example = "validated")]
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateInvoiceRequest {
    /// Overrides the configured tolerance for this validation.
    #[schema(value_type = Option<String>, example = "2.5")]
    pub tolerance_percent: Option<Decimal>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvoiceFilter {
    pub vendor_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoicesListData {
    pub data: Vec<Invoice>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceValidationData {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    #[schema(example = "EUR")]
    pub currency: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(flatten)]
    pub validation: SpendValidation,
}

fn allowed_transitions(from: &str) -> &'static [&'static str] {
    match from {
        "received" => &["validated", "disputed"],
        "validated" => &["paid", "disputed"],
        "disputed" => &["validated"],
        _ => &[],
    }
}

#[utoipa::path(
    post,
    path = "/api/invoices",
    tag = "Invoices",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Invoice recorded", body = Envelope<Invoice>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Vendor not found", body = ApiError),
        (status = 409, description = "Invoice number already exists for the vendor", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Invoice>>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if payload.amount < Decimal::ZERO {
        return Err(ApiError::bad_request(
            "Invoice amount must not be negative",
            "INVALID_AMOUNT",
        ));
    }

    if payload.period_end < payload.period_start {
        return Err(ApiError::bad_request(
            "Billing period end must not precede its start",
            "INVALID_PERIOD",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::INVOICES, Level::Write)?;

    let vendor_exists: i64 = vendors::table
        .filter(vendors::id.eq(payload.vendor_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if vendor_exists == 0 {
        return Err(ApiError::not_found("Vendor not found", "VENDOR_NOT_FOUND"));
    }

    let invoice: Invoice = diesel::insert_into(invoices::table)
        .values(&NewInvoice {
            vendor_id: payload.vendor_id,
            invoice_number: payload.invoice_number.clone(),
            currency: payload.currency.to_uppercase(),
            amount: payload.amount,
            period_start: payload.period_start,
            period_end: payload.period_end,
            status: "received".to_string(),
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, invoice_number = %payload.invoice_number, "Failed to record invoice");
            ApiError::conflict(
                "Invoice with this number already exists for the vendor",
                "INVOICE_EXISTS",
            )
        })?;

    info!(invoice_id = %invoice.id, vendor_id = %invoice.vendor_id, recorded_by = %actor.id, "Recorded invoice");

    Ok((StatusCode::CREATED, Envelope::new(invoice)))
}

#[utoipa::path(
    get,
    path = "/api/invoices",
    tag = "Invoices",
    params(PaginationParams, InvoiceFilter),
    responses(
        (status = 200, description = "Paginated list of invoices", body = Envelope<InvoicesListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<InvoiceFilter>,
) -> ApiResult<Json<Envelope<InvoicesListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::INVOICES, Level::View)?;

    let mut count_query = invoices::table.into_boxed();
    let mut list_query = invoices::table.into_boxed();

    if let Some(vendor_id) = filter.vendor_id {
        count_query = count_query.filter(invoices::vendor_id.eq(vendor_id));
        list_query = list_query.filter(invoices::vendor_id.eq(vendor_id));
    }
    if let Some(ref status) = filter.status {
        count_query = count_query.filter(invoices::status.eq(status.clone()));
        list_query = list_query.filter(invoices::status.eq(status.clone()));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<Invoice> = list_query
        .order(invoices::period_start.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(InvoicesListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    get,
    path = "/api/invoices/{invoice_id}",
    tag = "Invoices",
    params(("invoice_id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice details", body = Envelope<Invoice>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Invoice not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<Invoice>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::INVOICES, Level::View)?;

    let invoice: Invoice = invoices::table
        .filter(invoices::id.eq(invoice_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Invoice not found", "INVOICE_NOT_FOUND"))?;

    Ok(Envelope::new(invoice))
}

/// Corrections are only possible before the invoice leaves `received`.
#[utoipa::path(
    put,
    path = "/api/invoices/{invoice_id}",
    tag = "Invoices",
    params(("invoice_id" = Uuid, Path, description = "Invoice ID")),
    request_body = UpdateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice updated", body = Envelope<Invoice>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Invoice not found", body = ApiError),
        (status = 409, description = "Invoice is no longer editable", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> ApiResult<Json<Envelope<Invoice>>> {
    if let Some(amount) = payload.amount {
        if amount < Decimal::ZERO {
            return Err(ApiError::bad_request(
                "Invoice amount must not be negative",
                "INVALID_AMOUNT",
            ));
        }
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::INVOICES, Level::Write)?;

    let invoice: Invoice = invoices::table
        .filter(invoices::id.eq(invoice_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Invoice not found", "INVOICE_NOT_FOUND"))?;

    if invoice.status != "received" {
        return Err(ApiError::conflict(
            "Only invoices in received status can be edited",
            "INVOICE_NOT_EDITABLE",
        ));
    }

    let period_start = payload.period_start.unwrap_or(invoice.period_start);
    let period_end = payload.period_end.unwrap_or(invoice.period_end);
    if period_end < period_start {
        return Err(ApiError::bad_request(
            "Billing period end must not precede its start",
            "INVALID_PERIOD",
        ));
    }

    let now = Utc::now().naive_utc();

    let updated: Invoice = diesel::update(invoices::table.filter(invoices::id.eq(invoice_id)))
        .set((
            invoices::amount.eq(payload.amount.unwrap_or(invoice.amount)),
            invoices::period_start.eq(period_start),
            invoices::period_end.eq(period_end),
            invoices::updated_at.eq(now),
        ))
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    info!(invoice_id = %invoice_id, updated_by = %actor.id, "Updated invoice");

    Ok(Envelope::new(updated))
}

#[utoipa::path(
    post,
    path = "/api/invoices/{invoice_id}/status",
    tag = "Invoices",
    params(("invoice_id" = Uuid, Path, description = "Invoice ID")),
    request_body = InvoiceStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = Envelope<Invoice>),
        (status = 400, description = "Unknown status", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Invoice not found", body = ApiError),
        (status = 409, description = "Transition not allowed", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_invoice_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<InvoiceStatusRequest>,
) -> ApiResult<Json<Envelope<Invoice>>> {
    if !matches!(
        payload.status.as_str(),
        "received" | "validated" | "disputed" | "paid"
    ) {
        return Err(ApiError::bad_request(
            "status must be one of received, validated, disputed, paid",
            "INVALID_STATUS",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::INVOICES, Level::Write)?;

    let invoice: Invoice = invoices::table
        .filter(invoices::id.eq(invoice_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Invoice not found", "INVOICE_NOT_FOUND"))?;

    if !allowed_transitions(&invoice.status).contains(&payload.status.as_str()) {
        return Err(ApiError::conflict(
            format!(
                "Cannot transition invoice from {} to {}",
                invoice.status, payload.status
            ),
            "INVALID_STATUS_TRANSITION",
        ));
    }

    let now = Utc::now().naive_utc();

    let updated: Invoice = diesel::update(invoices::table.filter(invoices::id.eq(invoice_id)))
        .set((
            invoices::status.eq(&payload.status),
            invoices::updated_at.eq(now),
        ))
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    info!(invoice_id = %invoice_id, status = %payload.status, changed_by = %actor.id, "Invoice status changed");

    Ok(Envelope::new(updated))
}

/// Computes expected spend from timesheets over the billing period and
/// classifies the invoiced amount against it.
#[utoipa::path(
    post,
    path = "/api/invoices/{invoice_id}/validate",
    tag = "Invoices",
    params(("invoice_id" = Uuid, Path, description = "Invoice ID")),
    request_body = ValidateInvoiceRequest,
    responses(
        (status = 200, description = "Validation result", body = Envelope<InvoiceValidationData>),
        (status = 400, description = "Invalid tolerance or missing exchange rate", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Invoice not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn validate_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<ValidateInvoiceRequest>,
) -> ApiResult<Json<Envelope<InvoiceValidationData>>> {
    let tolerance = match payload.tolerance_percent {
        Some(t) if t < Decimal::ZERO => {
            return Err(ApiError::bad_request(
                "Tolerance must not be negative",
                "INVALID_TOLERANCE",
            ));
        }
        Some(t) => t,
        None => Decimal::from_f64_retain(state.billing_config.tolerance_percent)
            .unwrap_or(Decimal::from(5)),
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::INVOICES, Level::Write)?;

    let invoice: Invoice = invoices::table
        .filter(invoices::id.eq(invoice_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Invoice not found", "INVOICE_NOT_FOUND"))?;

    // Entries in the billing period plus each member's role for rate lookup.
    let entries: Vec<(Uuid, NaiveDate, Decimal, Uuid, String)> = timesheet_entries::table
        .inner_join(team_members::table)
        .filter(timesheet_entries::vendor_id.eq(invoice.vendor_id))
        .filter(timesheet_entries::work_date.ge(invoice.period_start))
        .filter(timesheet_entries::work_date.le(invoice.period_end))
        .select((
            timesheet_entries::team_member_id,
            timesheet_entries::work_date,
            timesheet_entries::hours,
            team_members::role_id,
            team_members::display_name,
        ))
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let cards: Vec<RateCard> = rate_cards::table
        .filter(rate_cards::vendor_id.eq(invoice.vendor_id))
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    // One line per (member, rate card); members without a card are reported
    // separately and contribute nothing to the expected amount.
    let mut lines: HashMap<(Uuid, Uuid), SpendLine> = HashMap::new();
    let mut unrated: HashMap<Uuid, UnratedMember> = HashMap::new();
    let mut fx_cache: HashMap<String, Option<Decimal>> = HashMap::new();

    for (member_id, work_date, hours, role_id, display_name) in entries {
        let Some(card) = spend::applicable_rate(&cards, role_id, work_date) else {
            let entry = unrated.entry(member_id).or_insert_with(|| UnratedMember {
                team_member_id: member_id,
                display_name: display_name.clone(),
                hours: Decimal::ZERO,
            });
            entry.hours += hours;
            continue;
        };

        let fx_rate = match fx_cache.entry(card.currency.clone()) {
            std::collections::hash_map::Entry::Occupied(e) => *e.get(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let rate = if card.currency.eq_ignore_ascii_case(&invoice.currency) {
                    Some(Decimal::ONE)
                } else {
                    fx::rate_on_or_before(
                        &mut conn,
                        &card.currency,
                        &invoice.currency,
                        invoice.period_end,
                    )
                    .map_err(|_| ApiError::db_error())?
                };
                *e.insert(rate)
            }
        };

        let Some(fx_rate) = fx_rate else {
            warn!(
                invoice_id = %invoice.id,
                from = %card.currency,
                to = %invoice.currency,
                "No exchange rate for spend validation"
            );
            return Err(ApiError::bad_request(
                format!(
                    "No exchange rate from {} to {} on or before {}",
                    card.currency, invoice.currency, invoice.period_end
                ),
                "MISSING_EXCHANGE_RATE",
            ));
        };

        let line = lines
            .entry((member_id, card.id))
            .or_insert_with(|| SpendLine {
                team_member_id: member_id,
                display_name: display_name.clone(),
                hours: Decimal::ZERO,
                hourly_rate: card.hourly_rate,
                rate_currency: card.currency.clone(),
                amount: Decimal::ZERO,
            });
        line.hours += hours;
        line.amount += hours * card.hourly_rate * fx_rate;
    }

    let mut breakdown: Vec<SpendLine> = lines.into_values().collect();
    breakdown.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    let mut unrated_members: Vec<UnratedMember> = unrated.into_values().collect();
    unrated_members.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    let expected: Decimal = breakdown.iter().map(|l| l.amount).sum();
    let (discrepancy, discrepancy_percent, within_tolerance) =
        spend::evaluate(invoice.amount, expected, tolerance);

    record_invoice_validation(within_tolerance);

    info!(
        invoice_id = %invoice.id,
        expected = %expected,
        invoiced = %invoice.amount,
        within_tolerance,
        "Invoice validated against timesheets"
    );

    Ok(Envelope::new(InvoiceValidationData {
        invoice_id: invoice.id,
        invoice_number: invoice.invoice_number,
        currency: invoice.currency,
        period_start: invoice.period_start,
        period_end: invoice.period_end,
        validation: SpendValidation {
            invoiced_amount: invoice.amount,
            expected_amount: expected,
            discrepancy,
            discrepancy_percent,
            within_tolerance,
            tolerance_percent: tolerance,
            breakdown,
            unrated_members,
        },
    }))
}
