//! Access control handlers: permission groups, group membership, resource
//! grants, and permission checks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    access::{self, enforce, resource_keys, Level},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{NewGroupMember, NewPermissionGroup, NewResourcePermission, PermissionGroup,
        ResourcePermission, User},
    pagination::{PaginationMeta, PaginationParams},
    schema::{group_members, permission_groups, resource_permissions, users},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGroupRequest {
    #[schema(example = "delivery-managers")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddGroupMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGrantRequest {
    #[schema(example = "invoices")]
    pub resource_key: String,
    /// Exactly one of user_id and group_id must be set.
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckAccessRequest {
    pub user_id: Uuid,
    #[schema(example = "invoices")]
    pub resource: String,
    #[schema(example = "write")]
    pub level: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GrantFilter {
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub resource_key: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupsListData {
    pub data: Vec<PermissionGroup>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GrantsListData {
    pub data: Vec<ResourcePermission>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResourcesData {
    pub user_id: Uuid,
    #[schema(example = "write")]
    pub permission_level: String,
    pub is_super: bool,
    pub resources: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckAccessData {
    pub allowed: bool,
    #[schema(example = "resource_granted")]
    pub reason: String,
}

#[utoipa::path(
    post,
    path = "/api/access/groups",
    tag = "Access Control",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created", body = Envelope<PermissionGroup>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 409, description = "Group already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<PermissionGroup>>)> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("Group name is required", "VALIDATION_ERROR"));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    let group: PermissionGroup = diesel::insert_into(permission_groups::table)
        .values(&NewPermissionGroup {
            name: payload.name.trim().to_string(),
            description: payload.description,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, name = %payload.name, "Failed to create permission group");
            ApiError::conflict("Group with this name already exists", "GROUP_EXISTS")
        })?;

    info!(group_id = %group.id, name = %group.name, created_by = %actor.id, "Created permission group");

    Ok((StatusCode::CREATED, Envelope::new(group)))
}

#[utoipa::path(
    get,
    path = "/api/access/groups",
    tag = "Access Control",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of groups", body = Envelope<GroupsListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<Envelope<GroupsListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    let total_count: i64 = permission_groups::table
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<PermissionGroup> = permission_groups::table
        .order(permission_groups::name.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(GroupsListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/access/groups/{group_id}",
    tag = "Access Control",
    params(("group_id" = Uuid, Path, description = "Group ID")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Group not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    // Grants and memberships go with the group.
    let deleted = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(
                resource_permissions::table.filter(resource_permissions::group_id.eq(group_id)),
            )
            .execute(conn)?;

            diesel::delete(group_members::table.filter(group_members::group_id.eq(group_id)))
                .execute(conn)?;

            diesel::delete(permission_groups::table.filter(permission_groups::id.eq(group_id)))
                .execute(conn)
        })
        .map_err(|_| ApiError::internal("Failed to delete group", "DELETE_FAILED"))?;

    if deleted == 0 {
        return Err(ApiError::not_found("Group not found", "GROUP_NOT_FOUND"));
    }

    info!(group_id = %group_id, deleted_by = %actor.id, "Deleted permission group");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/access/groups/{group_id}/members",
    tag = "Access Control",
    params(("group_id" = Uuid, Path, description = "Group ID")),
    request_body = AddGroupMemberRequest,
    responses(
        (status = 201, description = "Member added"),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Group or user not found", body = ApiError),
        (status = 409, description = "User already in group", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_group_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<AddGroupMemberRequest>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    let group_exists: i64 = permission_groups::table
        .filter(permission_groups::id.eq(group_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if group_exists == 0 {
        return Err(ApiError::not_found("Group not found", "GROUP_NOT_FOUND"));
    }

    let user_exists: i64 = users::table
        .filter(users::id.eq(payload.user_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if user_exists == 0 {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    diesel::insert_into(group_members::table)
        .values(&NewGroupMember {
            group_id,
            user_id: payload.user_id,
        })
        .execute(&mut conn)
        .map_err(|_| ApiError::conflict("User is already in the group", "ALREADY_MEMBER"))?;

    info!(group_id = %group_id, user_id = %payload.user_id, added_by = %actor.id, "Added group member");

    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/api/access/groups/{group_id}/members/{user_id}",
    tag = "Access Control",
    params(
        ("group_id" = Uuid, Path, description = "Group ID"),
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Membership not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_group_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    let deleted = diesel::delete(
        group_members::table
            .filter(group_members::group_id.eq(group_id))
            .filter(group_members::user_id.eq(user_id)),
    )
    .execute(&mut conn)
    .map_err(|_| ApiError::internal("Failed to remove member", "DELETE_FAILED"))?;

    if deleted == 0 {
        return Err(ApiError::not_found(
            "User is not a member of the group",
            "MEMBERSHIP_NOT_FOUND",
        ));
    }

    info!(group_id = %group_id, user_id = %user_id, removed_by = %actor.id, "Removed group member");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/access/permissions",
    tag = "Access Control",
    request_body = CreateGrantRequest,
    responses(
        (status = 201, description = "Grant created", body = Envelope<ResourcePermission>),
        (status = 400, description = "Invalid grant", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "User or group not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_grant(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateGrantRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<ResourcePermission>>)> {
    if !resource_keys::is_known(&payload.resource_key) {
        return Err(ApiError::bad_request(
            format!("Unknown resource key '{}'", payload.resource_key),
            "UNKNOWN_RESOURCE_KEY",
        ));
    }

    if payload.user_id.is_some() == payload.group_id.is_some() {
        return Err(ApiError::bad_request(
            "Exactly one of user_id and group_id must be provided",
            "INVALID_GRANT_TARGET",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    if let Some(user_id) = payload.user_id {
        let exists: i64 = users::table
            .filter(users::id.eq(user_id))
            .count()
            .get_result(&mut conn)
            .map_err(|_| ApiError::db_error())?;
        if exists == 0 {
            return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
        }
    }

    if let Some(group_id) = payload.group_id {
        let exists: i64 = permission_groups::table
            .filter(permission_groups::id.eq(group_id))
            .count()
            .get_result(&mut conn)
            .map_err(|_| ApiError::db_error())?;
        if exists == 0 {
            return Err(ApiError::not_found("Group not found", "GROUP_NOT_FOUND"));
        }
    }

    let grant: ResourcePermission = diesel::insert_into(resource_permissions::table)
        .values(&NewResourcePermission {
            resource_key: payload.resource_key.clone(),
            user_id: payload.user_id,
            group_id: payload.group_id,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, resource_key = %payload.resource_key, "Failed to create grant");
            ApiError::internal("Failed to create grant", "GRANT_CREATE_ERROR")
        })?;

    info!(grant_id = %grant.id, resource_key = %grant.resource_key, granted_by = %actor.id, "Created resource grant");

    Ok((StatusCode::CREATED, Envelope::new(grant)))
}

#[utoipa::path(
    get,
    path = "/api/access/permissions",
    tag = "Access Control",
    params(PaginationParams, GrantFilter),
    responses(
        (status = 200, description = "Paginated list of grants", body = Envelope<GrantsListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_grants(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<GrantFilter>,
) -> ApiResult<Json<Envelope<GrantsListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    let mut count_query = resource_permissions::table.into_boxed();
    let mut list_query = resource_permissions::table.into_boxed();

    if let Some(user_id) = filter.user_id {
        count_query = count_query.filter(resource_permissions::user_id.eq(user_id));
        list_query = list_query.filter(resource_permissions::user_id.eq(user_id));
    }
    if let Some(group_id) = filter.group_id {
        count_query = count_query.filter(resource_permissions::group_id.eq(group_id));
        list_query = list_query.filter(resource_permissions::group_id.eq(group_id));
    }
    if let Some(ref key) = filter.resource_key {
        count_query = count_query.filter(resource_permissions::resource_key.eq(key.clone()));
        list_query = list_query.filter(resource_permissions::resource_key.eq(key.clone()));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<ResourcePermission> = list_query
        .order(resource_permissions::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(GrantsListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/access/permissions/{grant_id}",
    tag = "Access Control",
    params(("grant_id" = Uuid, Path, description = "Grant ID")),
    responses(
        (status = 204, description = "Grant deleted"),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Grant not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_grant(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(grant_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    let deleted =
        diesel::delete(resource_permissions::table.filter(resource_permissions::id.eq(grant_id)))
            .execute(&mut conn)
            .map_err(|_| ApiError::internal("Failed to delete grant", "DELETE_FAILED"))?;

    if deleted == 0 {
        return Err(ApiError::not_found("Grant not found", "GRANT_NOT_FOUND"));
    }

    info!(grant_id = %grant_id, deleted_by = %actor.id, "Deleted resource grant");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/access/users/{user_id}/resources",
    tag = "Access Control",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Effective accessible resources", body = Envelope<UserResourcesData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user_resources(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<UserResourcesData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    let mut resources: Vec<String> = access::accessible_resources(&mut conn, user.id)
        .map_err(|_| ApiError::db_error())?
        .into_iter()
        .collect();
    resources.sort();

    Ok(Envelope::new(UserResourcesData {
        user_id: user.id,
        permission_level: user.permission_level,
        is_super: user.is_super,
        resources,
    }))
}

#[utoipa::path(
    post,
    path = "/api/access/check",
    tag = "Access Control",
    request_body = CheckAccessRequest,
    responses(
        (status = 200, description = "Access decision", body = Envelope<CheckAccessData>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn check_access(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CheckAccessRequest>,
) -> ApiResult<Json<Envelope<CheckAccessData>>> {
    let required = Level::parse(&payload.level).ok_or_else(|| {
        ApiError::bad_request(
            "level must be one of denied, view, write, admin",
            "INVALID_PERMISSION_LEVEL",
        )
    })?;

    if !resource_keys::is_known(&payload.resource) {
        return Err(ApiError::bad_request(
            format!("Unknown resource key '{}'", payload.resource),
            "UNKNOWN_RESOURCE_KEY",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::ACCESS_CONTROL, Level::Admin)?;

    let user: User = users::table
        .filter(users::id.eq(payload.user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    let decision = access::check(&mut conn, &user, &payload.resource, required)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(CheckAccessData {
        allowed: decision.allowed,
        reason: decision.reason.to_string(),
    }))
}
