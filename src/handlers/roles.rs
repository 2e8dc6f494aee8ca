//! Job role handlers. Roles describe what a team member does (and which
//! rate card applies); they are unrelated to access control.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{NewRole, Role},
    pagination::{PaginationMeta, PaginationParams},
    schema::{rate_cards, roles, team_members},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    #[schema(example = "Senior Engineer")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolesListData {
    pub data: Vec<Role>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "Roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = Envelope<Role>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 409, description = "Role already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<Role>>)> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("Role name is required", "VALIDATION_ERROR"));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ROLES, Level::Write)?;

    let role: Role = diesel::insert_into(roles::table)
        .values(&NewRole {
            name: payload.name.trim().to_string(),
            description: payload.description,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, name = %payload.name, "Failed to create role");
            ApiError::conflict("Role with this name already exists", "ROLE_EXISTS")
        })?;

    info!(role_id = %role.id, name = %role.name, created_by = %actor.id, "Created role");

    Ok((StatusCode::CREATED, Envelope::new(role)))
}

#[utoipa::path(
    get,
    path = "/api/roles",
    tag = "Roles",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of roles", body = Envelope<RolesListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<Envelope<RolesListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::ROLES, Level::View)?;

    let total_count: i64 = roles::table
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<Role> = roles::table
        .order(roles::name.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(RolesListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    put,
    path = "/api/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = Envelope<Role>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<Envelope<Role>>> {
    if payload.name.is_none() && payload.description.is_none() {
        return Err(ApiError::bad_request(
            "At least one field (name or description) must be provided",
            "NO_FIELDS_TO_UPDATE",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ROLES, Level::Write)?;

    let query = diesel::update(roles::table.filter(roles::id.eq(role_id)));

    let updated: Role = match (payload.name, payload.description) {
        (Some(name), Some(desc)) => query
            .set((roles::name.eq(name), roles::description.eq(desc)))
            .get_result(&mut conn),
        (Some(name), None) => query.set(roles::name.eq(name)).get_result(&mut conn),
        (None, Some(desc)) => query.set(roles::description.eq(desc)).get_result(&mut conn),
        (None, None) => unreachable!(),
    }
    .map_err(|_| ApiError::not_found("Role not found", "ROLE_NOT_FOUND"))?;

    info!(role_id = %role_id, updated_by = %actor.id, "Updated role");

    Ok(Envelope::new(updated))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{role_id}",
    tag = "Roles",
    params(("role_id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError),
        (status = 409, description = "Role is still referenced", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ROLES, Level::Write)?;

    let members_using: i64 = team_members::table
        .filter(team_members::role_id.eq(role_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let cards_using: i64 = rate_cards::table
        .filter(rate_cards::role_id.eq(role_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    if members_using > 0 || cards_using > 0 {
        return Err(ApiError::conflict(
            "Role is referenced by team members or rate cards",
            "ROLE_IN_USE",
        ));
    }

    let deleted = diesel::delete(roles::table.filter(roles::id.eq(role_id)))
        .execute(&mut conn)
        .map_err(|_| ApiError::internal("Failed to delete role", "DELETE_FAILED"))?;

    if deleted == 0 {
        return Err(ApiError::not_found("Role not found", "ROLE_NOT_FOUND"));
    }

    info!(role_id = %role_id, deleted_by = %actor.id, "Deleted role");

    Ok(StatusCode::NO_CONTENT)
}
