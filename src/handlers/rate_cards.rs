//! Rate card handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{NewRateCard, RateCard},
    pagination::{PaginationMeta, PaginationParams},
    schema::{rate_cards, roles, vendors},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRateCardRequest {
    pub vendor_id: Uuid,
    pub role_id: Uuid,
    #[schema(value_type = String, example = "85.00")]
    pub hourly_rate: Decimal,
    #[schema(example = "EUR")]
    pub currency: String,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RateCardFilter {
    pub vendor_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RateCardsListData {
    pub data: Vec<RateCard>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/api/rate-cards",
    tag = "Rate Cards",
    request_body = CreateRateCardRequest,
    responses(
        (status = 201, description = "Rate card created", body = Envelope<RateCard>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Vendor or role not found", body = ApiError),
        (status = 409, description = "Overlapping open-ended rate card", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_rate_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateRateCardRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<RateCard>>)> {
    if payload.hourly_rate <= Decimal::ZERO {
        return Err(ApiError::bad_request(
            "Hourly rate must be positive",
            "INVALID_RATE",
        ));
    }

    if payload.currency.len() != 3 {
        return Err(ApiError::bad_request(
            "Currency must be a 3-letter code",
            "INVALID_CURRENCY",
        ));
    }

    if let Some(to) = payload.effective_to {
        if to < payload.effective_from {
            return Err(ApiError::bad_request(
                "effective_to must not precede effective_from",
                "INVALID_DATE_RANGE",
            ));
        }
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::RATE_CARDS, Level::Write)?;

    let vendor_exists: i64 = vendors::table
        .filter(vendors::id.eq(payload.vendor_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if vendor_exists == 0 {
        return Err(ApiError::not_found("Vendor not found", "VENDOR_NOT_FOUND"));
    }

    let role_exists: i64 = roles::table
        .filter(roles::id.eq(payload.role_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if role_exists == 0 {
        return Err(ApiError::not_found("Role not found", "ROLE_NOT_FOUND"));
    }

    // At most one open-ended card per (vendor, role).
    if payload.effective_to.is_none() {
        let open_ended: i64 = rate_cards::table
            .filter(rate_cards::vendor_id.eq(payload.vendor_id))
            .filter(rate_cards::role_id.eq(payload.role_id))
            .filter(rate_cards::effective_to.is_null())
            .count()
            .get_result(&mut conn)
            .map_err(|_| ApiError::db_error())?;
        if open_ended > 0 {
            return Err(ApiError::conflict(
                "An open-ended rate card already exists for this vendor and role",
                "RATE_CARD_OVERLAP",
            ));
        }
    }

    let card: RateCard = diesel::insert_into(rate_cards::table)
        .values(&NewRateCard {
            vendor_id: payload.vendor_id,
            role_id: payload.role_id,
            hourly_rate: payload.hourly_rate,
            currency: payload.currency.to_uppercase(),
            effective_from: payload.effective_from,
            effective_to: payload.effective_to,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, "Failed to create rate card");
            ApiError::internal("Failed to create rate card", "RATE_CARD_CREATE_ERROR")
        })?;

    info!(rate_card_id = %card.id, vendor_id = %card.vendor_id, role_id = %card.role_id, created_by = %actor.id, "Created rate card");

    Ok((StatusCode::CREATED, Envelope::new(card)))
}

#[utoipa::path(
    get,
    path = "/api/rate-cards",
    tag = "Rate Cards",
    params(PaginationParams, RateCardFilter),
    responses(
        (status = 200, description = "Paginated list of rate cards", body = Envelope<RateCardsListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_rate_cards(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<RateCardFilter>,
) -> ApiResult<Json<Envelope<RateCardsListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::RATE_CARDS, Level::View)?;

    let mut count_query = rate_cards::table.into_boxed();
    let mut list_query = rate_cards::table.into_boxed();

    if let Some(vendor_id) = filter.vendor_id {
        count_query = count_query.filter(rate_cards::vendor_id.eq(vendor_id));
        list_query = list_query.filter(rate_cards::vendor_id.eq(vendor_id));
    }
    if let Some(role_id) = filter.role_id {
        count_query = count_query.filter(rate_cards::role_id.eq(role_id));
        list_query = list_query.filter(rate_cards::role_id.eq(role_id));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<RateCard> = list_query
        .order(rate_cards::effective_from.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(RateCardsListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/rate-cards/{rate_card_id}",
    tag = "Rate Cards",
    params(("rate_card_id" = Uuid, Path, description = "Rate card ID")),
    responses(
        (status = 204, description = "Rate card deleted"),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Rate card not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_rate_card(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(rate_card_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::RATE_CARDS, Level::Write)?;

    let deleted = diesel::delete(rate_cards::table.filter(rate_cards::id.eq(rate_card_id)))
        .execute(&mut conn)
        .map_err(|_| ApiError::internal("Failed to delete rate card", "DELETE_FAILED"))?;

    if deleted == 0 {
        return Err(ApiError::not_found(
            "Rate card not found",
            "RATE_CARD_NOT_FOUND",
        ));
    }

    info!(rate_card_id = %rate_card_id, deleted_by = %actor.id, "Deleted rate card");

    Ok(StatusCode::NO_CONTENT)
}
