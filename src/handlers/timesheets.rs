//! Timesheet entry handlers.

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
    import::timesheets::MAX_HOURS_PER_DAY,
    models::{NewTimesheetEntry, TeamMember, TimesheetEntry},
    pagination::{PaginationMeta, PaginationParams},
    schema::{team_members, timesheet_entries},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTimesheetEntryRequest {
    pub team_member_id: Uuid,
    pub work_date: NaiveDate,
    #[schema(value_type = String, example = "7.5")]
    pub hours: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TimesheetFilter {
    pub team_member_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TimesheetListData {
    pub data: Vec<TimesheetEntry>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/api/timesheets",
    tag = "Timesheets",
    request_body = CreateTimesheetEntryRequest,
    responses(
        (status = 201, description = "Entry recorded", body = Envelope<TimesheetEntry>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Team member not found", body = ApiError),
        (status = 409, description = "Entry already exists for this member and date", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_timesheet_entry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTimesheetEntryRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<TimesheetEntry>>)> {
    if payload.hours <= Decimal::ZERO || payload.hours > Decimal::from(MAX_HOURS_PER_DAY) {
        return Err(ApiError::bad_request(
            "Hours must be between 0 and 24",
            "INVALID_HOURS",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::TIMESHEETS, Level::Write)?;

    let member: TeamMember = team_members::table
        .filter(team_members::id.eq(payload.team_member_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Team member not found", "TEAM_MEMBER_NOT_FOUND"))?;

    let entry: TimesheetEntry = diesel::insert_into(timesheet_entries::table)
        .values(&NewTimesheetEntry {
            team_member_id: member.id,
            vendor_id: member.vendor_id,
            work_date: payload.work_date,
            hours: payload.hours,
            notes: payload.notes,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, team_member_id = %member.id, "Failed to record timesheet entry");
            ApiError::conflict(
                "An entry already exists for this member and date",
                "TIMESHEET_ENTRY_EXISTS",
            )
        })?;

    info!(entry_id = %entry.id, team_member_id = %member.id, recorded_by = %actor.id, "Recorded timesheet entry");

    Ok((StatusCode::CREATED, Envelope::new(entry)))
}

#[utoipa::path(
    get,
    path = "/api/timesheets",
    tag = "Timesheets",
    params(PaginationParams, TimesheetFilter),
    responses(
        (status = 200, description = "Paginated list of timesheet entries", body = Envelope<TimesheetListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_timesheet_entries(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<TimesheetFilter>,
) -> ApiResult<Json<Envelope<TimesheetListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::TIMESHEETS, Level::View)?;

    let mut count_query = timesheet_entries::table.into_boxed();
    let mut list_query = timesheet_entries::table.into_boxed();

    if let Some(member_id) = filter.team_member_id {
        count_query = count_query.filter(timesheet_entries::team_member_id.eq(member_id));
        list_query = list_query.filter(timesheet_entries::team_member_id.eq(member_id));
    }
    if let Some(vendor_id) = filter.vendor_id {
        count_query = count_query.filter(timesheet_entries::vendor_id.eq(vendor_id));
        list_query = list_query.filter(timesheet_entries::vendor_id.eq(vendor_id));
    }
    if let Some(from) = filter.from {
        count_query = count_query.filter(timesheet_entries::work_date.ge(from));
        list_query = list_query.filter(timesheet_entries::work_date.ge(from));
    }
    if let Some(to) = filter.to {
        count_query = count_query.filter(timesheet_entries::work_date.le(to));
        list_query = list_query.filter(timesheet_entries::work_date.le(to));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<TimesheetEntry> = list_query
        .order(timesheet_entries::work_date.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(TimesheetListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/timesheets/{entry_id}",
    tag = "Timesheets",
    params(("entry_id" = Uuid, Path, description = "Timesheet entry ID")),
    responses(
        (status = 204, description = "Entry deleted"),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Entry not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_timesheet_entry(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(entry_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::TIMESHEETS, Level::Write)?;

    let deleted = diesel::delete(timesheet_entries::table.filter(timesheet_entries::id.eq(entry_id)))
        .execute(&mut conn)
        .map_err(|_| ApiError::internal("Failed to delete entry", "DELETE_FAILED"))?;

    if deleted == 0 {
        return Err(ApiError::not_found(
            "Timesheet entry not found",
            "TIMESHEET_ENTRY_NOT_FOUND",
        ));
    }

    info!(entry_id = %entry_id, deleted_by = %actor.id, "Deleted timesheet entry");

    Ok(StatusCode::NO_CONTENT)
}
