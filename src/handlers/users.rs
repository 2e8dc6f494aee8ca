//! User management handlers: invitation-based account creation, listing,
//! updates, and the invitation audit trail.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    auth::tokens::{self, TokenKind},
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    handlers::auth::UserResponse,
    models::{InvitationAuditEntry, NewInvitationAuditEntry, NewUser, User},
    pagination::{PaginationMeta, PaginationParams},
    schema::{invitation_audit_log, users},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct InviteUserRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "dana@example.com")]
    pub email: String,
    #[schema(example = "Dana Petrov")]
    pub full_name: Option<String>,
    #[schema(example = "view")]
    pub permission_level: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    #[schema(example = "write")]
    pub permission_level: Option<String>,
    pub is_super: Option<bool>,
    #[schema(example = "active")]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationData {
    pub user: UserResponse,
    /// Opaque invitation token; the caller's mailer delivers both halves.
    pub invitation_token: String,
    pub url_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsersListData {
    pub data: Vec<UserResponse>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogData {
    pub user_id: Uuid,
    pub entries: Vec<AuditEntryData>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntryData {
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub detail: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of users", body = Envelope<UsersListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<Envelope<UsersListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::USERS, Level::View)?;

    let total_count: i64 = users::table
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<User> = users::table
        .order(users::email.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(UsersListData {
        data: rows.into_iter().map(Into::into).collect(),
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = Envelope<UserResponse>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::USERS, Level::View)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    Ok(Envelope::new(user.into()))
}

/// Invite a new user. The account is created in `invited` status with no
/// password; the returned token pair completes the flow.
#[utoipa::path(
    post,
    path = "/api/users/invite",
    tag = "Users",
    request_body = InviteUserRequest,
    responses(
        (status = 201, description = "Invitation created", body = Envelope<InvitationData>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 409, description = "User already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn invite_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<InviteUserRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<InvitationData>>)> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if Level::parse(&payload.permission_level).is_none() {
        return Err(ApiError::bad_request(
            "permission_level must be one of denied, view, write, admin",
            "INVALID_PERMISSION_LEVEL",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::USERS, Level::Admin)?;

    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            email: payload.email.to_lowercase(),
            password_hash: None,
            full_name: payload.full_name,
            permission_level: payload.permission_level,
            is_super: false,
            status: "invited".to_string(),
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, email = %payload.email, "Failed to invite user");
            ApiError::conflict("User with this email already exists", "USER_EXISTS")
        })?;

    let invitation_token = tokens::issue_account_token(
        &mut conn,
        user.id,
        TokenKind::Invitation,
        state.token_config.invitation_expiry_hours,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to create invitation token");
        ApiError::internal("Failed to create invitation", "INVITATION_TOKEN_ERROR")
    })?;

    let url_token =
        tokens::generate_url_token(&state.jwt_config, user.id, &user.email, TokenKind::Invitation)
            .map_err(|e| {
                error!(error = %e, "Failed to create invitation URL token");
                ApiError::internal("Failed to create invitation", "INVITATION_TOKEN_ERROR")
            })?;

    let _ = diesel::insert_into(invitation_audit_log::table)
        .values(&NewInvitationAuditEntry {
            user_id: user.id,
            actor_id: Some(actor.id),
            action: "invited".to_string(),
            detail: None,
        })
        .execute(&mut conn);

    info!(user_id = %user.id, email = %user.email, invited_by = %actor.id, "User invited");

    Ok((
        StatusCode::CREATED,
        Envelope::new(InvitationData {
            user: user.into(),
            invitation_token,
            url_token,
        }),
    ))
}

/// Revoke an outstanding invitation. The account stays in `invited` status
/// but its tokens can no longer be redeemed.
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/revoke-invitation",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Invitation revoked"),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 409, description = "Invitation already accepted", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::USERS, Level::Admin)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    if user.status != "invited" {
        return Err(ApiError::conflict(
            "Invitation has already been accepted",
            "INVITATION_ALREADY_ACCEPTED",
        ));
    }

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        use crate::schema::account_tokens;

        diesel::delete(
            account_tokens::table
                .filter(account_tokens::user_id.eq(user.id))
                .filter(account_tokens::kind.eq(TokenKind::Invitation.as_str())),
        )
        .execute(conn)?;

        diesel::insert_into(invitation_audit_log::table)
            .values(&NewInvitationAuditEntry {
                user_id: user.id,
                actor_id: Some(actor.id),
                action: "revoked".to_string(),
                detail: None,
            })
            .execute(conn)?;

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, "Failed to revoke invitation");
        ApiError::internal("Failed to revoke invitation", "INVITATION_REVOKE_ERROR")
    })?;

    info!(user_id = %user.id, revoked_by = %actor.id, "Invitation revoked");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = Envelope<UserResponse>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<Envelope<UserResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::USERS, Level::Admin)?;

    if let Some(ref level) = payload.permission_level {
        if Level::parse(level).is_none() {
            return Err(ApiError::bad_request(
                "permission_level must be one of denied, view, write, admin",
                "INVALID_PERMISSION_LEVEL",
            ));
        }
    }

    if let Some(ref status) = payload.status {
        if !matches!(status.as_str(), "active" | "inactive") {
            return Err(ApiError::bad_request(
                "status must be active or inactive",
                "INVALID_STATUS",
            ));
        }
    }

    // Only super-users may grant or remove the super flag.
    if payload.is_super.is_some() && !actor.is_super {
        return Err(ApiError::forbidden(
            "Only super-users can change the super flag",
            "SUPER_FLAG_RESTRICTED",
        ));
    }

    let target: User = users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    if payload.status.is_some() && target.status == "invited" {
        return Err(ApiError::bad_request(
            "Invited users become active by accepting their invitation",
            "USER_NOT_ACCEPTED",
        ));
    }

    let now = Utc::now().naive_utc();

    let updated: User = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            if let Some(full_name) = payload.full_name {
                diesel::update(users::table.filter(users::id.eq(user_id)))
                    .set(users::full_name.eq(Some(full_name)))
                    .execute(conn)?;
            }
            if let Some(level) = payload.permission_level {
                diesel::update(users::table.filter(users::id.eq(user_id)))
                    .set(users::permission_level.eq(level))
                    .execute(conn)?;
            }
            if let Some(is_super) = payload.is_super {
                diesel::update(users::table.filter(users::id.eq(user_id)))
                    .set(users::is_super.eq(is_super))
                    .execute(conn)?;
            }
            if let Some(status) = payload.status {
                diesel::update(users::table.filter(users::id.eq(user_id)))
                    .set(users::status.eq(status))
                    .execute(conn)?;
            }

            diesel::update(users::table.filter(users::id.eq(user_id)))
                .set(users::updated_at.eq(now))
                .get_result(conn)
        })
        .map_err(|e| {
            error!(error = %e, "Failed to update user");
            ApiError::internal("Failed to update user", "USER_UPDATE_ERROR")
        })?;

    info!(user_id = %user_id, updated_by = %actor.id, "User updated");

    Ok(Envelope::new(updated.into()))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/audit",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Invitation audit trail", body = Envelope<AuditLogData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user_audit_log(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<AuditLogData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::USERS, Level::Admin)?;

    let exists: i64 = users::table
        .filter(users::id.eq(user_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if exists == 0 {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    let entries: Vec<InvitationAuditEntry> = invitation_audit_log::table
        .filter(invitation_audit_log::user_id.eq(user_id))
        .order(invitation_audit_log::created_at.desc())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(AuditLogData {
        user_id,
        entries: entries
            .into_iter()
            .map(|e| AuditEntryData {
                action: e.action,
                actor_id: e.actor_id,
                detail: e.detail,
                created_at: e.created_at,
            })
            .collect(),
    }))
}
