//! Vendor management handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{NewTag, NewVendor, NewVendorTag, Tag, Vendor},
    pagination::{PaginationMeta, PaginationParams},
    schema::{tags, vendor_tags, vendors},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateVendorRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    #[schema(example = "Acme Consulting")]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Slug must be 1-100 characters"))]
    #[schema(example = "acme-consulting")]
    pub slug: String,
    pub contact_name: Option<String>,
    #[validate(email(message = "Invalid contact email"))]
    pub contact_email: Option<String>,
    #[schema(example = "NL")]
    pub country: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateVendorRequest {
    pub name: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub country: Option<String>,
    #[schema(example = "inactive")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetVendorTagsRequest {
    #[schema(example = json!(["offshore", "strategic"]))]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VendorFilter {
    /// Filter by vendor status (`active` or `inactive`).
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VendorData {
    #[serde(flatten)]
    pub vendor: Vendor,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VendorsListData {
    pub data: Vec<Vendor>,
    pub pagination: PaginationMeta,
}

fn load_vendor_tags(conn: &mut PgConnection, vendor_id: Uuid) -> QueryResult<Vec<String>> {
    vendor_tags::table
        .inner_join(tags::table)
        .filter(vendor_tags::vendor_id.eq(vendor_id))
        .order(tags::name.asc())
        .select(tags::name)
        .load(conn)
}

#[utoipa::path(
    post,
    path = "/api/vendors",
    tag = "Vendors",
    request_body = CreateVendorRequest,
    responses(
        (status = 201, description = "Vendor created", body = Envelope<Vendor>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 409, description = "Vendor already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_vendor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateVendorRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Vendor>>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::VENDORS, Level::Write)?;

    let vendor: Vendor = diesel::insert_into(vendors::table)
        .values(&NewVendor {
            name: payload.name.clone(),
            slug: payload.slug.to_lowercase(),
            status: "active".to_string(),
            contact_name: payload.contact_name,
            contact_email: payload.contact_email,
            country: payload.country,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, name = %payload.name, "Failed to create vendor");
            ApiError::conflict("Vendor with this name or slug already exists", "VENDOR_EXISTS")
        })?;

    info!(vendor_id = %vendor.id, name = %vendor.name, created_by = %actor.id, "Created vendor");

    Ok((StatusCode::CREATED, Envelope::new(vendor)))
}

#[utoipa::path(
    get,
    path = "/api/vendors",
    tag = "Vendors",
    params(PaginationParams, VendorFilter),
    responses(
        (status = 200, description = "Paginated list of vendors", body = Envelope<VendorsListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_vendors(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<VendorFilter>,
) -> ApiResult<Json<Envelope<VendorsListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::VENDORS, Level::View)?;

    let mut count_query = vendors::table.into_boxed();
    let mut list_query = vendors::table.into_boxed();

    if let Some(ref status) = filter.status {
        count_query = count_query.filter(vendors::status.eq(status.clone()));
        list_query = list_query.filter(vendors::status.eq(status.clone()));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<Vendor> = list_query
        .order(vendors::name.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(VendorsListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    get,
    path = "/api/vendors/{vendor_id}",
    tag = "Vendors",
    params(("vendor_id" = Uuid, Path, description = "Vendor ID")),
    responses(
        (status = 200, description = "Vendor details with tags", body = Envelope<VendorData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Vendor not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_vendor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(vendor_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<VendorData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::VENDORS, Level::View)?;

    let vendor: Vendor = vendors::table
        .filter(vendors::id.eq(vendor_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Vendor not found", "VENDOR_NOT_FOUND"))?;

    let tag_names = load_vendor_tags(&mut conn, vendor_id).map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(VendorData {
        vendor,
        tags: tag_names,
    }))
}

#[utoipa::path(
    put,
    path = "/api/vendors/{vendor_id}",
    tag = "Vendors",
    params(("vendor_id" = Uuid, Path, description = "Vendor ID")),
    request_body = UpdateVendorRequest,
    responses(
        (status = 200, description = "Vendor updated", body = Envelope<Vendor>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Vendor not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_vendor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(vendor_id): Path<Uuid>,
    Json(payload): Json<UpdateVendorRequest>,
) -> ApiResult<Json<Envelope<Vendor>>> {
    if let Some(ref status) = payload.status {
        if !matches!(status.as_str(), "active" | "inactive") {
            return Err(ApiError::bad_request(
                "status must be active or inactive",
                "INVALID_STATUS",
            ));
        }
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::VENDORS, Level::Write)?;

    let now = Utc::now().naive_utc();

    let updated: Vendor = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            if let Some(name) = payload.name {
                diesel::update(vendors::table.filter(vendors::id.eq(vendor_id)))
                    .set(vendors::name.eq(name))
                    .execute(conn)?;
            }
            if let Some(contact_name) = payload.contact_name {
                diesel::update(vendors::table.filter(vendors::id.eq(vendor_id)))
                    .set(vendors::contact_name.eq(Some(contact_name)))
                    .execute(conn)?;
            }
            if let Some(contact_email) = payload.contact_email {
                diesel::update(vendors::table.filter(vendors::id.eq(vendor_id)))
                    .set(vendors::contact_email.eq(Some(contact_email)))
                    .execute(conn)?;
            }
            if let Some(country) = payload.country {
                diesel::update(vendors::table.filter(vendors::id.eq(vendor_id)))
                    .set(vendors::country.eq(Some(country)))
                    .execute(conn)?;
            }
            if let Some(status) = payload.status {
                diesel::update(vendors::table.filter(vendors::id.eq(vendor_id)))
                    .set(vendors::status.eq(status))
                    .execute(conn)?;
            }

            diesel::update(vendors::table.filter(vendors::id.eq(vendor_id)))
                .set(vendors::updated_at.eq(now))
                .get_result(conn)
        })
        .map_err(|e| {
            warn!(error = %e, vendor_id = %vendor_id, "Failed to update vendor");
            ApiError::not_found("Vendor not found", "VENDOR_NOT_FOUND")
        })?;

    info!(vendor_id = %vendor_id, updated_by = %actor.id, "Updated vendor");

    Ok(Envelope::new(updated))
}

/// Replaces the vendor's tag set. Unknown tags are created on the fly.
#[utoipa::path(
    put,
    path = "/api/vendors/{vendor_id}/tags",
    tag = "Vendors",
    params(("vendor_id" = Uuid, Path, description = "Vendor ID")),
    request_body = SetVendorTagsRequest,
    responses(
        (status = 200, description = "Tags replaced", body = Envelope<VendorData>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Vendor not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_vendor_tags(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(vendor_id): Path<Uuid>,
    Json(payload): Json<SetVendorTagsRequest>,
) -> ApiResult<Json<Envelope<VendorData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::VENDORS, Level::Write)?;

    let vendor: Vendor = vendors::table
        .filter(vendors::id.eq(vendor_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Vendor not found", "VENDOR_NOT_FOUND"))?;

    let mut names: Vec<String> = payload
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    names.sort();
    names.dedup();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(vendor_tags::table.filter(vendor_tags::vendor_id.eq(vendor_id)))
            .execute(conn)?;

        for name in &names {
            let tag: Tag = match tags::table
                .filter(tags::name.eq(name))
                .first(conn)
                .optional()?
            {
                Some(tag) => tag,
                None => diesel::insert_into(tags::table)
                    .values(&NewTag { name: name.clone() })
                    .get_result(conn)?,
            };

            diesel::insert_into(vendor_tags::table)
                .values(&NewVendorTag {
                    vendor_id,
                    tag_id: tag.id,
                })
                .execute(conn)?;
        }

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, vendor_id = %vendor_id, "Failed to set vendor tags");
        ApiError::internal("Failed to set vendor tags", "VENDOR_TAGS_ERROR")
    })?;

    info!(vendor_id = %vendor_id, tag_count = names.len(), "Replaced vendor tags");

    Ok(Envelope::new(VendorData {
        vendor,
        tags: names,
    }))
}
