//! Contract management handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{Contract, NewContract},
    pagination::{PaginationMeta, PaginationParams},
    schema::{contracts, vendors},
    AppState,
};

const CONTRACT_STATUSES: &[&str] = &["draft", "active", "expired", "terminated"];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateContractRequest {
    pub vendor_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    #[schema(example = "Platform delivery 2026")]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Reference must be 1-100 characters"))]
    #[schema(example = "CTR-2026-014")]
    pub reference: String,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    #[schema(value_type = String, example = "250000.00")]
    pub value: Decimal,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    #[schema(example = "EUR")]
    pub currency: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateContractRequest {
    pub title: Option<String>,
    pub ends_on: Option<NaiveDate>,
    #[schema(value_type = Option<String>)]
    pub value: Option<Decimal>,
    #[schema(example = "active")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ContractFilter {
    pub vendor_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContractsListData {
    pub data: Vec<Contract>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/api/contracts",
    tag = "Contracts",
    request_body = CreateContractRequest,
    responses(
        (status = 201, description = "Contract created", body = Envelope<Contract>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Vendor not found", body = ApiError),
        (status = 409, description = "Contract reference already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_contract(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateContractRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Contract>>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if payload.value < Decimal::ZERO {
        return Err(ApiError::bad_request(
            "Contract value must not be negative",
            "INVALID_VALUE",
        ));
    }

    if let Some(ends_on) = payload.ends_on {
        if ends_on < payload.starts_on {
            return Err(ApiError::bad_request(
                "Contract end date must not precede its start date",
                "INVALID_DATE_RANGE",
            ));
        }
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::CONTRACTS, Level::Write)?;

    let vendor_exists: i64 = vendors::table
        .filter(vendors::id.eq(payload.vendor_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if vendor_exists == 0 {
        return Err(ApiError::not_found("Vendor not found", "VENDOR_NOT_FOUND"));
    }

    let contract: Contract = diesel::insert_into(contracts::table)
        .values(&NewContract {
            vendor_id: payload.vendor_id,
            title: payload.title,
            reference: payload.reference.clone(),
            starts_on: payload.starts_on,
            ends_on: payload.ends_on,
            value: payload.value,
            currency: payload.currency.to_uppercase(),
            status: "draft".to_string(),
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, reference = %payload.reference, "Failed to create contract");
            ApiError::conflict(
                "Contract with this reference already exists for the vendor",
                "CONTRACT_EXISTS",
            )
        })?;

    info!(contract_id = %contract.id, vendor_id = %contract.vendor_id, created_by = %actor.id, "Created contract");

    Ok((StatusCode::CREATED, Envelope::new(contract)))
}

#[utoipa::path(
    get,
    path = "/api/contracts",
    tag = "Contracts",
    params(PaginationParams, ContractFilter),
    responses(
        (status = 200, description = "Paginated list of contracts", body = Envelope<ContractsListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_contracts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ContractFilter>,
) -> ApiResult<Json<Envelope<ContractsListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::CONTRACTS, Level::View)?;

    let mut count_query = contracts::table.into_boxed();
    let mut list_query = contracts::table.into_boxed();

    if let Some(vendor_id) = filter.vendor_id {
        count_query = count_query.filter(contracts::vendor_id.eq(vendor_id));
        list_query = list_query.filter(contracts::vendor_id.eq(vendor_id));
    }
    if let Some(ref status) = filter.status {
        count_query = count_query.filter(contracts::status.eq(status.clone()));
        list_query = list_query.filter(contracts::status.eq(status.clone()));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<Contract> = list_query
        .order(contracts::starts_on.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(ContractsListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    get,
    path = "/api/contracts/{contract_id}",
    tag = "Contracts",
    params(("contract_id" = Uuid, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Contract details", body = Envelope<Contract>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Contract not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_contract(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contract_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<Contract>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::CONTRACTS, Level::View)?;

    let contract: Contract = contracts::table
        .filter(contracts::id.eq(contract_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Contract not found", "CONTRACT_NOT_FOUND"))?;

    Ok(Envelope::new(contract))
}

#[utoipa::path(
    put,
    path = "/api/contracts/{contract_id}",
    tag = "Contracts",
    params(("contract_id" = Uuid, Path, description = "Contract ID")),
    request_body = UpdateContractRequest,
    responses(
        (status = 200, description = "Contract updated", body = Envelope<Contract>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Contract not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_contract(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<UpdateContractRequest>,
) -> ApiResult<Json<Envelope<Contract>>> {
    if let Some(ref status) = payload.status {
        if !CONTRACT_STATUSES.contains(&status.as_str()) {
            return Err(ApiError::bad_request(
                "status must be one of draft, active, expired, terminated",
                "INVALID_STATUS",
            ));
        }
    }

    if let Some(value) = payload.value {
        if value < Decimal::ZERO {
            return Err(ApiError::bad_request(
                "Contract value must not be negative",
                "INVALID_VALUE",
            ));
        }
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::CONTRACTS, Level::Write)?;

    let now = Utc::now().naive_utc();

    let updated: Contract = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            if let Some(title) = payload.title {
                diesel::update(contracts::table.filter(contracts::id.eq(contract_id)))
                    .set(contracts::title.eq(title))
                    .execute(conn)?;
            }
            if let Some(ends_on) = payload.ends_on {
                diesel::update(contracts::table.filter(contracts::id.eq(contract_id)))
                    .set(contracts::ends_on.eq(Some(ends_on)))
                    .execute(conn)?;
            }
            if let Some(value) = payload.value {
                diesel::update(contracts::table.filter(contracts::id.eq(contract_id)))
                    .set(contracts::value.eq(value))
                    .execute(conn)?;
            }
            if let Some(status) = payload.status {
                diesel::update(contracts::table.filter(contracts::id.eq(contract_id)))
                    .set(contracts::status.eq(status))
                    .execute(conn)?;
            }

            diesel::update(contracts::table.filter(contracts::id.eq(contract_id)))
                .set(contracts::updated_at.eq(now))
                .get_result(conn)
        })
        .map_err(|_| ApiError::not_found("Contract not found", "CONTRACT_NOT_FOUND"))?;

    info!(contract_id = %contract_id, updated_by = %actor.id, "Updated contract");

    Ok(Envelope::new(updated))
}
