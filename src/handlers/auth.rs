//! Authentication handlers: login, token refresh, and the account-token
//! flows (invitation acceptance, password reset).

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    access,
    auth::{
        jwt::{Claims, JwtConfig},
        password::PasswordService,
        tokens::{self, TokenError, TokenKind},
    },
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{NewInvitationAuditEntry, NewRefreshToken, User},
    schema::{invitation_audit_log, refresh_tokens, users},
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ops@example.com")]
    pub email: String,
    #[schema(example = "securepassword123")]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "ops@example.com")]
    pub email: String,
    pub full_name: Option<String>,
    #[schema(example = "write")]
    pub permission_level: String,
    pub is_super: bool,
    #[schema(example = "active")]
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            permission_level: user.permission_level,
            is_super: user.is_super,
            status: user.status,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthData {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshData {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserData {
    pub user: UserResponse,
    /// Effective accessible resource keys (empty for admins and super-users,
    /// who bypass resource checks).
    pub accessible_resources: Vec<String>,
}

fn store_refresh_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    token: &str,
    expires_in_secs: i64,
) -> Result<(), diesel::result::Error> {
    let expires_at = (Utc::now() + Duration::seconds(expires_in_secs)).naive_utc();

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            user_id,
            token_hash: tokens::hash_token(token),
            expires_at,
        })
        .execute(conn)?;

    Ok(())
}

fn verify_stored_token(conn: &mut PgConnection, token: &str) -> Result<Uuid, &'static str> {
    let token_hash = tokens::hash_token(token);
    let now = Utc::now().naive_utc();

    let result: Result<(Uuid, chrono::NaiveDateTime), _> = refresh_tokens::table
        .filter(refresh_tokens::token_hash.eq(&token_hash))
        .select((refresh_tokens::user_id, refresh_tokens::expires_at))
        .first(conn);

    match result {
        Ok((user_id, expires_at)) => {
            if expires_at < now {
                let _ = diesel::delete(
                    refresh_tokens::table.filter(refresh_tokens::token_hash.eq(&token_hash)),
                )
                .execute(conn);
                Err("Refresh token has expired")
            } else {
                Ok(user_id)
            }
        }
        Err(_) => Err("Invalid refresh token"),
    }
}

fn invalidate_token(conn: &mut PgConnection, token: &str) -> Result<(), diesel::result::Error> {
    let token_hash = tokens::hash_token(token);
    diesel::delete(refresh_tokens::table.filter(refresh_tokens::token_hash.eq(&token_hash)))
        .execute(conn)?;
    Ok(())
}

fn generate_tokens(
    jwt_config: &Arc<JwtConfig>,
    conn: &mut PgConnection,
    user: &User,
) -> ApiResult<(String, String)> {
    let access_token = jwt_config
        .generate_access_token(user.id, &user.email, &user.permission_level, user.is_super)
        .map_err(|e| {
            error!(error = %e, "Token generation failed");
            ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
        })?;

    let refresh_token = jwt_config.generate_refresh_token(user.id).map_err(|e| {
        error!(error = %e, "Token generation failed");
        ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
    })?;

    store_refresh_token(conn, user.id, &refresh_token, jwt_config.refresh_token_expiry).map_err(
        |e| {
            error!(error = %e, "Failed to store refresh token");
            ApiError::internal("Token storage failed", "TOKEN_STORAGE_ERROR")
        },
    )?;

    Ok((access_token, refresh_token))
}

fn write_audit(
    conn: &mut PgConnection,
    user_id: Uuid,
    actor_id: Option<Uuid>,
    action: &str,
    detail: Option<String>,
) -> Result<(), diesel::result::Error> {
    diesel::insert_into(invitation_audit_log::table)
        .values(&NewInvitationAuditEntry {
            user_id,
            actor_id,
            action: action.to_string(),
            detail,
        })
        .execute(conn)?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = Envelope<AuthData>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 403, description = "Account is inactive", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<Envelope<AuthData>>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::email.eq(payload.email.to_lowercase()))
        .first(&mut conn)
        .map_err(|_| {
            warn!(email = %payload.email, "Login attempt for unknown user");
            record_auth_attempt("login", AuthOutcome::InvalidCredentials);
            ApiError::unauthorized("Invalid credentials", "INVALID_CREDENTIALS")
        })?;

    if user.status == "inactive" {
        warn!(user_id = %user.id, "Login attempt for inactive user");
        record_auth_attempt("login", AuthOutcome::AccountInactive);
        return Err(ApiError::forbidden(
            "Account is inactive",
            "ACCOUNT_INACTIVE",
        ));
    }

    // Invited users have no password yet; refuse without leaking state.
    let Some(password_hash) = user.password_hash.clone() else {
        warn!(user_id = %user.id, "Login attempt before invitation accepted");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    };

    let is_valid =
        PasswordService::verify_password(&payload.password, &password_hash).map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed login attempt");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        return Err(ApiError::unauthorized(
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        ));
    }

    let (access_token, refresh_token) = generate_tokens(&state.jwt_config, &mut conn, &user)?;

    record_auth_attempt("login", AuthOutcome::Success);
    info!(user_id = %user.id, email = %user.email, "User logged in");

    Ok(Envelope::new(AuthData {
        user: user.into(),
        access_token,
        refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = Envelope<RefreshData>),
        (status = 401, description = "Invalid or expired refresh token", body = ApiError),
        (status = 403, description = "Account is inactive", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<Envelope<RefreshData>>> {
    let refresh_claims = state
        .jwt_config
        .verify_refresh_token(&payload.refresh_token)
        .map_err(|_| {
            ApiError::unauthorized("Invalid or expired refresh token", "INVALID_REFRESH_TOKEN")
        })?;

    let user_id = Uuid::parse_str(&refresh_claims.sub).map_err(|e| {
        error!(error = %e, "Invalid user ID in refresh token");
        ApiError::bad_request("Invalid token format", "INVALID_TOKEN_FORMAT")
    })?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let stored_user_id = verify_stored_token(&mut conn, &payload.refresh_token).map_err(|msg| {
        warn!(user_id = %user_id, "Refresh token not found in database");
        ApiError::unauthorized(msg, "INVALID_REFRESH_TOKEN")
    })?;

    if stored_user_id != user_id {
        warn!(claimed_user_id = %user_id, stored_user_id = %stored_user_id, "Refresh token user mismatch");
        return Err(ApiError::unauthorized(
            "Invalid refresh token",
            "TOKEN_USER_MISMATCH",
        ));
    }

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::unauthorized("User not found", "USER_NOT_FOUND"))?;

    if user.status != "active" {
        return Err(ApiError::forbidden(
            "Account is inactive",
            "ACCOUNT_INACTIVE",
        ));
    }

    if state.rotate_refresh_tokens {
        invalidate_token(&mut conn, &payload.refresh_token).map_err(|e| {
            error!(error = %e, "Failed to invalidate old refresh token");
            ApiError::internal("Token invalidation failed", "TOKEN_INVALIDATION_ERROR")
        })?;

        let (access_token, refresh_token) = generate_tokens(&state.jwt_config, &mut conn, &user)?;

        info!(user_id = %user.id, "Tokens refreshed (rotated)");

        Ok(Envelope::new(RefreshData {
            access_token,
            refresh_token,
        }))
    } else {
        let access_token = state
            .jwt_config
            .generate_access_token(user.id, &user.email, &user.permission_level, user.is_super)
            .map_err(|e| {
                error!(error = %e, "Token generation failed");
                ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
            })?;

        info!(user_id = %user.id, "Access token refreshed");

        Ok(Envelope::new(RefreshData {
            access_token,
            refresh_token: payload.refresh_token,
        }))
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let _ = invalidate_token(&mut conn, &payload.refresh_token);
    info!("User logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user information", body = Envelope<CurrentUserData>),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Envelope<CurrentUserData>>> {
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid user ID in token", "INVALID_USER_ID"))?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

    let mut accessible: Vec<String> = access::accessible_resources(&mut conn, user.id)
        .map_err(|_| ApiError::db_error())?
        .into_iter()
        .collect();
    accessible.sort();

    Ok(Envelope::new(CurrentUserData {
        user: user.into(),
        accessible_resources: accessible,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "ops@example.com")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForgotPasswordData {
    /// Opaque reset token; the caller's mailer delivers both halves.
    /// Null when no active account matches the email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetPasswordData {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    pub url_token: String,
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AcceptInvitationRequest {
    pub url_token: String,
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub password: String,
}

/// Request a password reset token pair. Always responds 200 so the endpoint
/// cannot be used to enumerate accounts.
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    tag = "Authentication",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset initiated", body = Envelope<ForgotPasswordData>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 429, description = "Too many requests", body = ApiError)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<Envelope<ForgotPasswordData>>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: Option<User> = users::table
        .filter(users::email.eq(payload.email.to_lowercase()))
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error looking up user");
            ApiError::db_error()
        })?;

    let Some(user) = user.filter(|u| u.status == "active") else {
        return Ok(Envelope::with_message(
            ForgotPasswordData {
                reset_token: None,
                url_token: None,
            },
            "No active account found",
        ));
    };

    let window_hours = state.token_config.reset_expiry_hours;

    let opaque = tokens::issue_account_token(
        &mut conn,
        user.id,
        TokenKind::PasswordReset,
        window_hours,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to create password reset token");
        ApiError::internal("Failed to initiate password reset", "RESET_TOKEN_ERROR")
    })?;

    let url_token =
        tokens::generate_url_token(&state.jwt_config, user.id, &user.email, TokenKind::PasswordReset)
            .map_err(|e| {
                error!(error = %e, "Failed to create reset URL token");
                ApiError::internal("Failed to initiate password reset", "RESET_TOKEN_ERROR")
            })?;

    let _ = write_audit(&mut conn, user.id, None, "reset_requested", None);

    info!(user_id = %user.id, "Password reset requested");

    Ok(Envelope::with_message(
        ForgotPasswordData {
            reset_token: Some(opaque),
            url_token: Some(url_token),
        },
        "Password reset token created",
    ))
}

fn map_token_error(err: TokenError, code: &'static str) -> (StatusCode, Json<ApiError>) {
    match err {
        TokenError::Expired => ApiError::bad_request("Token has expired", code),
        _ => ApiError::bad_request("Invalid token", code),
    }
}

/// Reset password using a previously issued token pair.
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset successful", body = Envelope<ResetPasswordData>),
        (status = 400, description = "Invalid or expired token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<Json<Envelope<ResetPasswordData>>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if let Err(e) = state.password_policy.validate(&payload.password) {
        return Err(ApiError::bad_request(
            e.to_string(),
            "PASSWORD_POLICY_VIOLATION",
        ));
    }

    let verified = tokens::verify_url_token(
        &state.jwt_config,
        &payload.url_token,
        TokenKind::PasswordReset,
        state.token_config.reset_expiry_hours,
    )
    .map_err(|e| map_token_error(e, "INVALID_RESET_TOKEN"))?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::id.eq(verified.user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::bad_request("Invalid token", "INVALID_RESET_TOKEN"))?;

    if !user.email.eq_ignore_ascii_case(&verified.email) {
        warn!(user_id = %user.id, "Reset token email mismatch");
        return Err(ApiError::bad_request("Invalid token", "INVALID_RESET_TOKEN"));
    }

    let token_id = tokens::find_active_token(
        &mut conn,
        user.id,
        TokenKind::PasswordReset,
        &payload.token,
    )
    .map_err(|_| ApiError::db_error())?
    .ok_or_else(|| {
        ApiError::bad_request("Invalid or expired reset token", "INVALID_RESET_TOKEN")
    })?;

    let password_hash =
        PasswordService::hash_password_with_cost(&payload.password, state.password_hash_cost)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
            })?;

    let now = Utc::now().naive_utc();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::update(users::table.filter(users::id.eq(user.id)))
            .set((
                users::password_hash.eq(Some(password_hash)),
                users::updated_at.eq(now),
            ))
            .execute(conn)?;

        tokens::mark_token_used(conn, token_id)?;

        diesel::delete(refresh_tokens::table.filter(refresh_tokens::user_id.eq(user.id)))
            .execute(conn)?;

        write_audit(conn, user.id, None, "reset_completed", None)?;

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, "Failed to reset password");
        ApiError::internal("Failed to reset password", "PASSWORD_UPDATE_ERROR")
    })?;

    info!(user_id = %user.id, "Password reset completed");

    Ok(Envelope::with_message(
        ResetPasswordData { user_id: user.id },
        "Password has been reset",
    ))
}

/// Accept an invitation: sets the password, activates the account, and logs
/// the user in.
#[utoipa::path(
    post,
    path = "/api/auth/accept-invitation",
    tag = "Authentication",
    request_body = AcceptInvitationRequest,
    responses(
        (status = 200, description = "Invitation accepted", body = Envelope<AuthData>),
        (status = 400, description = "Invalid or expired token", body = ApiError),
        (status = 409, description = "Invitation already accepted", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn accept_invitation(
    State(state): State<AppState>,
    Json(payload): Json<AcceptInvitationRequest>,
) -> ApiResult<Json<Envelope<AuthData>>> {
    if let Err(e) = payload.validate() {
        return Err(ApiError::bad_request(
            format!("Validation error: {}", e),
            "VALIDATION_ERROR",
        ));
    }

    if let Err(e) = state.password_policy.validate(&payload.password) {
        return Err(ApiError::bad_request(
            e.to_string(),
            "PASSWORD_POLICY_VIOLATION",
        ));
    }

    let verified = tokens::verify_url_token(
        &state.jwt_config,
        &payload.url_token,
        TokenKind::Invitation,
        state.token_config.invitation_expiry_hours,
    )
    .map_err(|e| map_token_error(e, "INVALID_INVITATION_TOKEN"))?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: User = users::table
        .filter(users::id.eq(verified.user_id))
        .first(&mut conn)
        .map_err(|_| ApiError::bad_request("Invalid token", "INVALID_INVITATION_TOKEN"))?;

    if !user.email.eq_ignore_ascii_case(&verified.email) {
        warn!(user_id = %user.id, "Invitation token email mismatch");
        return Err(ApiError::bad_request(
            "Invalid token",
            "INVALID_INVITATION_TOKEN",
        ));
    }

    if user.status != "invited" {
        return Err(ApiError::conflict(
            "Invitation has already been accepted",
            "INVITATION_ALREADY_ACCEPTED",
        ));
    }

    let token_id =
        tokens::find_active_token(&mut conn, user.id, TokenKind::Invitation, &payload.token)
            .map_err(|_| ApiError::db_error())?
            .ok_or_else(|| {
                ApiError::bad_request(
                    "Invalid or expired invitation token",
                    "INVALID_INVITATION_TOKEN",
                )
            })?;

    let password_hash =
        PasswordService::hash_password_with_cost(&payload.password, state.password_hash_cost)
            .map_err(|e| {
                error!(error = %e, "Password hashing failed");
                ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
            })?;

    let now = Utc::now().naive_utc();

    // Password set, status transition, token burn, and audit entry are one
    // atomic step.
    let user: User = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            let user: User = diesel::update(users::table.filter(users::id.eq(user.id)))
                .set((
                    users::password_hash.eq(Some(password_hash)),
                    users::status.eq("active"),
                    users::updated_at.eq(now),
                ))
                .get_result(conn)?;

            tokens::mark_token_used(conn, token_id)?;

            write_audit(conn, user.id, None, "accepted", None)?;

            Ok(user)
        })
        .map_err(|e| {
            error!(error = %e, "Failed to accept invitation");
            ApiError::internal("Failed to accept invitation", "INVITATION_ACCEPT_ERROR")
        })?;

    let (access_token, refresh_token) = generate_tokens(&state.jwt_config, &mut conn, &user)?;

    info!(user_id = %user.id, "Invitation accepted");

    Ok(Envelope::with_message(
        AuthData {
            user: user.into(),
            access_token,
            refresh_token,
        },
        "Invitation accepted",
    ))
}
