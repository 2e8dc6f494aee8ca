//! Team member (vendor assignment) handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{NewTeamMember, TeamMember, User, Vendor},
    pagination::{PaginationMeta, PaginationParams},
    schema::{roles, team_members, users, vendors},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTeamMemberRequest {
    /// Optional link to a login account.
    pub user_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub role_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Display name must be 1-200 characters"))]
    #[schema(example = "Dana Petrov")]
    pub display_name: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "dana.petrov@acme.example")]
    pub email: String,
    pub starts_on: NaiveDate,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTeamMemberRequest {
    pub role_id: Option<Uuid>,
    pub display_name: Option<String>,
    #[schema(example = "inactive")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TeamMemberFilter {
    pub vendor_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeamMembersListData {
    pub data: Vec<TeamMember>,
    pub pagination: PaginationMeta,
}

/// An assignment against an inactive vendor, or linked to a non-active
/// user account, is refused.
fn check_assignment_targets(
    conn: &mut PgConnection,
    vendor_id: Uuid,
    user_id: Option<Uuid>,
) -> ApiResult<()> {
    let vendor: Vendor = vendors::table
        .filter(vendors::id.eq(vendor_id))
        .first(conn)
        .map_err(|_| ApiError::not_found("Vendor not found", "VENDOR_NOT_FOUND"))?;

    if vendor.status != "active" {
        return Err(ApiError::bad_request(
            "Cannot assign members to an inactive vendor",
            "VENDOR_INACTIVE",
        ));
    }

    if let Some(user_id) = user_id {
        let user: User = users::table
            .filter(users::id.eq(user_id))
            .first(conn)
            .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

        if user.status != "active" {
            return Err(ApiError::bad_request(
                "Cannot assign an inactive user",
                "USER_INACTIVE",
            ));
        }
    }

    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/team-members",
    tag = "Team Members",
    request_body = CreateTeamMemberRequest,
    responses(
        (status = 201, description = "Team member created", body = Envelope<TeamMember>),
        (status = 400, description = "Validation error or inactive user/vendor", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Vendor, role, or user not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_team_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTeamMemberRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<TeamMember>>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::TEAM_MEMBERS, Level::Write)?;

    check_assignment_targets(&mut conn, payload.vendor_id, payload.user_id)?;

    let role_exists: i64 = roles::table
        .filter(roles::id.eq(payload.role_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if role_exists == 0 {
        return Err(ApiError::not_found("Role not found", "ROLE_NOT_FOUND"));
    }

    let member: TeamMember = diesel::insert_into(team_members::table)
        .values(&NewTeamMember {
            user_id: payload.user_id,
            vendor_id: payload.vendor_id,
            role_id: payload.role_id,
            display_name: payload.display_name,
            email: payload.email.to_lowercase(),
            status: "active".to_string(),
            starts_on: payload.starts_on,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, "Failed to create team member");
            ApiError::internal("Failed to create team member", "TEAM_MEMBER_CREATE_ERROR")
        })?;

    info!(team_member_id = %member.id, vendor_id = %member.vendor_id, created_by = %actor.id, "Created team member");

    Ok((StatusCode::CREATED, Envelope::new(member)))
}

#[utoipa::path(
    get,
    path = "/api/team-members",
    tag = "Team Members",
    params(PaginationParams, TeamMemberFilter),
    responses(
        (status = 200, description = "Paginated list of team members", body = Envelope<TeamMembersListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_team_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<TeamMemberFilter>,
) -> ApiResult<Json<Envelope<TeamMembersListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::TEAM_MEMBERS, Level::View)?;

    let mut count_query = team_members::table.into_boxed();
    let mut list_query = team_members::table.into_boxed();

    if let Some(vendor_id) = filter.vendor_id {
        count_query = count_query.filter(team_members::vendor_id.eq(vendor_id));
        list_query = list_query.filter(team_members::vendor_id.eq(vendor_id));
    }
    if let Some(ref status) = filter.status {
        count_query = count_query.filter(team_members::status.eq(status.clone()));
        list_query = list_query.filter(team_members::status.eq(status.clone()));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<TeamMember> = list_query
        .order(team_members::display_name.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(TeamMembersListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    get,
    path = "/api/team-members/{member_id}",
    tag = "Team Members",
    params(("member_id" = Uuid, Path, description = "Team member ID")),
    responses(
        (status = 200, description = "Team member details", body = Envelope<TeamMember>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Team member not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_team_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<TeamMember>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::TEAM_MEMBERS, Level::View)?;

    let member: TeamMember = team_members::table
        .filter(team_members::id.eq(member_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Team member not found", "TEAM_MEMBER_NOT_FOUND"))?;

    Ok(Envelope::new(member))
}

#[utoipa::path(
    put,
    path = "/api/team-members/{member_id}",
    tag = "Team Members",
    params(("member_id" = Uuid, Path, description = "Team member ID")),
    request_body = UpdateTeamMemberRequest,
    responses(
        (status = 200, description = "Team member updated", body = Envelope<TeamMember>),
        (status = 400, description = "Invalid request or inactive user/vendor", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Team member not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_team_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(member_id): Path<Uuid>,
    Json(payload): Json<UpdateTeamMemberRequest>,
) -> ApiResult<Json<Envelope<TeamMember>>> {
    if let Some(ref status) = payload.status {
        if !matches!(status.as_str(), "active" | "inactive") {
            return Err(ApiError::bad_request(
                "status must be active or inactive",
                "INVALID_STATUS",
            ));
        }
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::TEAM_MEMBERS, Level::Write)?;

    let member: TeamMember = team_members::table
        .filter(team_members::id.eq(member_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Team member not found", "TEAM_MEMBER_NOT_FOUND"))?;

    // Reactivation re-checks the vendor and linked account.
    if payload.status.as_deref() == Some("active") && member.status != "active" {
        check_assignment_targets(&mut conn, member.vendor_id, member.user_id)?;
    }

    if let Some(role_id) = payload.role_id {
        let role_exists: i64 = roles::table
            .filter(roles::id.eq(role_id))
            .count()
            .get_result(&mut conn)
            .map_err(|_| ApiError::db_error())?;
        if role_exists == 0 {
            return Err(ApiError::not_found("Role not found", "ROLE_NOT_FOUND"));
        }
    }

    let now = Utc::now().naive_utc();

    let updated: TeamMember = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            if let Some(role_id) = payload.role_id {
                diesel::update(team_members::table.filter(team_members::id.eq(member_id)))
                    .set(team_members::role_id.eq(role_id))
                    .execute(conn)?;
            }
            if let Some(display_name) = payload.display_name {
                diesel::update(team_members::table.filter(team_members::id.eq(member_id)))
                    .set(team_members::display_name.eq(display_name))
                    .execute(conn)?;
            }
            if let Some(status) = payload.status {
                diesel::update(team_members::table.filter(team_members::id.eq(member_id)))
                    .set(team_members::status.eq(status))
                    .execute(conn)?;
            }

            diesel::update(team_members::table.filter(team_members::id.eq(member_id)))
                .set(team_members::updated_at.eq(now))
                .get_result(conn)
        })
        .map_err(|_| ApiError::not_found("Team member not found", "TEAM_MEMBER_NOT_FOUND"))?;

    info!(team_member_id = %member_id, updated_by = %actor.id, "Updated team member");

    Ok(Envelope::new(updated))
}
