//! Weekly delivery report handlers. Reports are drafted section by section
//! (the UI autosaves each section independently) and then submitted.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{
        NewReportAchievement, NewReportFocusItem, NewReportMilestone, NewReportRaidItem,
        NewReportVendorResource, NewWeeklyReport, ReportAchievement, ReportFocusItem,
        ReportMilestone, ReportRaidItem, ReportVendorResource, WeeklyReport,
    },
    pagination::{PaginationMeta, PaginationParams},
    schema::{
        report_achievements, report_focus_items, report_milestones, report_raid_items,
        report_vendor_resources, vendors, weekly_reports,
    },
    AppState,
};

const RAG_STATUSES: &[&str] = &["red", "amber", "green"];
const MILESTONE_STATUSES: &[&str] = &["on_track", "at_risk", "done"];
const RAID_KINDS: &[&str] = &["risk", "issue", "dependency"];
const RAID_SEVERITIES: &[&str] = &["low", "medium", "high"];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReportRequest {
    pub vendor_id: Uuid,
    /// Monday of the reported week.
    pub week_start: NaiveDate,
    #[schema(example = "green")]
    pub rag_status: String,
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateReportRequest {
    #[schema(example = "amber")]
    pub rag_status: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SectionItemsRequest {
    /// Section-shaped items; the section name in the path selects the schema.
    pub items: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct AchievementItem {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct FocusItem {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct MilestoneItem {
    pub title: String,
    pub due_on: Option<NaiveDate>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RaidItem {
    pub kind: String,
    pub description: String,
    pub severity: String,
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VendorResourceItem {
    pub role_name: String,
    pub headcount: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportFilter {
    pub vendor_id: Option<Uuid>,
    pub week_start: Option<NaiveDate>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportsListData {
    pub data: Vec<WeeklyReport>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportData {
    #[serde(flatten)]
    pub report: WeeklyReport,
    pub achievements: Vec<ReportAchievement>,
    pub focus_items: Vec<ReportFocusItem>,
    pub milestones: Vec<ReportMilestone>,
    pub raid_items: Vec<ReportRaidItem>,
    pub vendor_resources: Vec<ReportVendorResource>,
}

fn load_report_data(conn: &mut PgConnection, report: WeeklyReport) -> QueryResult<ReportData> {
    let achievements = report_achievements::table
        .filter(report_achievements::report_id.eq(report.id))
        .order(report_achievements::position.asc())
        .load(conn)?;
    let focus_items = report_focus_items::table
        .filter(report_focus_items::report_id.eq(report.id))
        .order(report_focus_items::position.asc())
        .load(conn)?;
    let milestones = report_milestones::table
        .filter(report_milestones::report_id.eq(report.id))
        .order(report_milestones::position.asc())
        .load(conn)?;
    let raid_items = report_raid_items::table
        .filter(report_raid_items::report_id.eq(report.id))
        .order(report_raid_items::position.asc())
        .load(conn)?;
    let vendor_resources = report_vendor_resources::table
        .filter(report_vendor_resources::report_id.eq(report.id))
        .order(report_vendor_resources::position.asc())
        .load(conn)?;

    Ok(ReportData {
        report,
        achievements,
        focus_items,
        milestones,
        raid_items,
        vendor_resources,
    })
}

fn parse_items<T: serde::de::DeserializeOwned>(
    items: serde_json::Value,
) -> Result<Vec<T>, (axum::http::StatusCode, Json<crate::error::ApiError>)> {
    serde_json::from_value(items).map_err(|e| {
        ApiError::bad_request(
            format!("Invalid section items: {}", e),
            "INVALID_SECTION_ITEMS",
        )
    })
}

#[utoipa::path(
    post,
    path = "/api/reports",
    tag = "Weekly Reports",
    request_body = CreateReportRequest,
    responses(
        (status = 201, description = "Draft report created", body = Envelope<WeeklyReport>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Vendor not found", body = ApiError),
        (status = 409, description = "Report already exists for this vendor and week", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateReportRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<WeeklyReport>>)> {
    if !RAG_STATUSES.contains(&payload.rag_status.as_str()) {
        return Err(ApiError::bad_request(
            "rag_status must be one of red, amber, green",
            "INVALID_RAG_STATUS",
        ));
    }

    if payload.week_start.weekday() != Weekday::Mon {
        return Err(ApiError::bad_request(
            "week_start must be a Monday",
            "INVALID_WEEK_START",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::REPORTS, Level::Write)?;

    let vendor_exists: i64 = vendors::table
        .filter(vendors::id.eq(payload.vendor_id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if vendor_exists == 0 {
        return Err(ApiError::not_found("Vendor not found", "VENDOR_NOT_FOUND"));
    }

    let report: WeeklyReport = diesel::insert_into(weekly_reports::table)
        .values(&NewWeeklyReport {
            vendor_id: payload.vendor_id,
            week_start: payload.week_start,
            rag_status: payload.rag_status,
            summary: payload.summary,
            status: "draft".to_string(),
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, vendor_id = %payload.vendor_id, "Failed to create report");
            ApiError::conflict(
                "A report already exists for this vendor and week",
                "REPORT_EXISTS",
            )
        })?;

    info!(report_id = %report.id, vendor_id = %report.vendor_id, created_by = %actor.id, "Created weekly report");

    Ok((StatusCode::CREATED, Envelope::new(report)))
}

#[utoipa::path(
    get,
    path = "/api/reports",
    tag = "Weekly Reports",
    params(PaginationParams, ReportFilter),
    responses(
        (status = 200, description = "Paginated list of reports", body = Envelope<ReportsListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_reports(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ReportFilter>,
) -> ApiResult<Json<Envelope<ReportsListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::REPORTS, Level::View)?;

    let mut count_query = weekly_reports::table.into_boxed();
    let mut list_query = weekly_reports::table.into_boxed();

    if let Some(vendor_id) = filter.vendor_id {
        count_query = count_query.filter(weekly_reports::vendor_id.eq(vendor_id));
        list_query = list_query.filter(weekly_reports::vendor_id.eq(vendor_id));
    }
    if let Some(week_start) = filter.week_start {
        count_query = count_query.filter(weekly_reports::week_start.eq(week_start));
        list_query = list_query.filter(weekly_reports::week_start.eq(week_start));
    }
    if let Some(ref status) = filter.status {
        count_query = count_query.filter(weekly_reports::status.eq(status.clone()));
        list_query = list_query.filter(weekly_reports::status.eq(status.clone()));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<WeeklyReport> = list_query
        .order(weekly_reports::week_start.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(ReportsListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    get,
    path = "/api/reports/{report_id}",
    tag = "Weekly Reports",
    params(("report_id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report with all sections", body = Envelope<ReportData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Report not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<ReportData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::REPORTS, Level::View)?;

    let report: WeeklyReport = weekly_reports::table
        .filter(weekly_reports::id.eq(report_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Report not found", "REPORT_NOT_FOUND"))?;

    let data = load_report_data(&mut conn, report).map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(data))
}

/// Header autosave: RAG status and summary.
#[utoipa::path(
    put,
    path = "/api/reports/{report_id}",
    tag = "Weekly Reports",
    params(("report_id" = Uuid, Path, description = "Report ID")),
    request_body = UpdateReportRequest,
    responses(
        (status = 200, description = "Report updated", body = Envelope<WeeklyReport>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Report not found", body = ApiError),
        (status = 409, description = "Report already submitted", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
    Json(payload): Json<UpdateReportRequest>,
) -> ApiResult<Json<Envelope<WeeklyReport>>> {
    if let Some(ref rag) = payload.rag_status {
        if !RAG_STATUSES.contains(&rag.as_str()) {
            return Err(ApiError::bad_request(
                "rag_status must be one of red, amber, green",
                "INVALID_RAG_STATUS",
            ));
        }
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::REPORTS, Level::Write)?;

    let report: WeeklyReport = weekly_reports::table
        .filter(weekly_reports::id.eq(report_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Report not found", "REPORT_NOT_FOUND"))?;

    if report.status != "draft" {
        return Err(ApiError::conflict(
            "Submitted reports can no longer be edited",
            "REPORT_SUBMITTED",
        ));
    }

    let now = Utc::now().naive_utc();

    let updated: WeeklyReport = conn
        .transaction::<_, diesel::result::Error, _>(|conn| {
            if let Some(rag) = payload.rag_status {
                diesel::update(weekly_reports::table.filter(weekly_reports::id.eq(report_id)))
                    .set(weekly_reports::rag_status.eq(rag))
                    .execute(conn)?;
            }
            if let Some(summary) = payload.summary {
                diesel::update(weekly_reports::table.filter(weekly_reports::id.eq(report_id)))
                    .set(weekly_reports::summary.eq(Some(summary)))
                    .execute(conn)?;
            }

            diesel::update(weekly_reports::table.filter(weekly_reports::id.eq(report_id)))
                .set(weekly_reports::updated_at.eq(now))
                .get_result(conn)
        })
        .map_err(|_| ApiError::db_error())?;

    info!(report_id = %report_id, updated_by = %actor.id, "Updated weekly report");

    Ok(Envelope::new(updated))
}

/// Section autosave: atomically replaces the named section's items.
#[utoipa::path(
    put,
    path = "/api/reports/{report_id}/sections/{section}",
    tag = "Weekly Reports",
    params(
        ("report_id" = Uuid, Path, description = "Report ID"),
        ("section" = String, Path, description = "achievements | focus | milestones | raid | resources")
    ),
    request_body = SectionItemsRequest,
    responses(
        (status = 200, description = "Section replaced", body = Envelope<ReportData>),
        (status = 400, description = "Unknown section or invalid items", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Report not found", body = ApiError),
        (status = 409, description = "Report already submitted", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn save_report_section(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((report_id, section)): Path<(Uuid, String)>,
    Json(payload): Json<SectionItemsRequest>,
) -> ApiResult<Json<Envelope<ReportData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::REPORTS, Level::Write)?;

    let report: WeeklyReport = weekly_reports::table
        .filter(weekly_reports::id.eq(report_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Report not found", "REPORT_NOT_FOUND"))?;

    if report.status != "draft" {
        return Err(ApiError::conflict(
            "Submitted reports can no longer be edited",
            "REPORT_SUBMITTED",
        ));
    }

    match section.as_str() {
        "achievements" => {
            let items: Vec<AchievementItem> = parse_items(payload.items)?;
            replace_achievements(&mut conn, report_id, items)?;
        }
        "focus" => {
            let items: Vec<FocusItem> = parse_items(payload.items)?;
            replace_focus_items(&mut conn, report_id, items)?;
        }
        "milestones" => {
            let items: Vec<MilestoneItem> = parse_items(payload.items)?;
            for item in &items {
                if !MILESTONE_STATUSES.contains(&item.status.as_str()) {
                    return Err(ApiError::bad_request(
                        "Milestone status must be one of on_track, at_risk, done",
                        "INVALID_MILESTONE_STATUS",
                    ));
                }
            }
            replace_milestones(&mut conn, report_id, items)?;
        }
        "raid" => {
            let items: Vec<RaidItem> = parse_items(payload.items)?;
            for item in &items {
                if !RAID_KINDS.contains(&item.kind.as_str()) {
                    return Err(ApiError::bad_request(
                        "RAID kind must be one of risk, issue, dependency",
                        "INVALID_RAID_KIND",
                    ));
                }
                if !RAID_SEVERITIES.contains(&item.severity.as_str()) {
                    return Err(ApiError::bad_request(
                        "RAID severity must be one of low, medium, high",
                        "INVALID_RAID_SEVERITY",
                    ));
                }
            }
            replace_raid_items(&mut conn, report_id, items)?;
        }
        "resources" => {
            let items: Vec<VendorResourceItem> = parse_items(payload.items)?;
            for item in &items {
                if item.headcount < 0 {
                    return Err(ApiError::bad_request(
                        "Headcount must not be negative",
                        "INVALID_HEADCOUNT",
                    ));
                }
            }
            replace_vendor_resources(&mut conn, report_id, items)?;
        }
        _ => {
            return Err(ApiError::bad_request(
                "Unknown section; expected achievements, focus, milestones, raid, or resources",
                "UNKNOWN_SECTION",
            ));
        }
    }

    let now = Utc::now().naive_utc();
    let report: WeeklyReport =
        diesel::update(weekly_reports::table.filter(weekly_reports::id.eq(report_id)))
            .set(weekly_reports::updated_at.eq(now))
            .get_result(&mut conn)
            .map_err(|_| ApiError::db_error())?;

    info!(report_id = %report_id, section = %section, saved_by = %actor.id, "Saved report section");

    let data = load_report_data(&mut conn, report).map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(data))
}

fn replace_achievements(
    conn: &mut PgConnection,
    report_id: Uuid,
    items: Vec<AchievementItem>,
) -> ApiResult<()> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(
            report_achievements::table.filter(report_achievements::report_id.eq(report_id)),
        )
        .execute(conn)?;

        let rows: Vec<NewReportAchievement> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| NewReportAchievement {
                report_id,
                position: i as i32,
                description: item.description,
            })
            .collect();

        diesel::insert_into(report_achievements::table)
            .values(&rows)
            .execute(conn)?;

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, report_id = %report_id, "Failed to replace achievements");
        ApiError::internal("Failed to save section", "SECTION_SAVE_ERROR")
    })
}

fn replace_focus_items(
    conn: &mut PgConnection,
    report_id: Uuid,
    items: Vec<FocusItem>,
) -> ApiResult<()> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(
            report_focus_items::table.filter(report_focus_items::report_id.eq(report_id)),
        )
        .execute(conn)?;

        let rows: Vec<NewReportFocusItem> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| NewReportFocusItem {
                report_id,
                position: i as i32,
                description: item.description,
            })
            .collect();

        diesel::insert_into(report_focus_items::table)
            .values(&rows)
            .execute(conn)?;

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, report_id = %report_id, "Failed to replace focus items");
        ApiError::internal("Failed to save section", "SECTION_SAVE_ERROR")
    })
}

fn replace_milestones(
    conn: &mut PgConnection,
    report_id: Uuid,
    items: Vec<MilestoneItem>,
) -> ApiResult<()> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(report_milestones::table.filter(report_milestones::report_id.eq(report_id)))
            .execute(conn)?;

        let rows: Vec<NewReportMilestone> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| NewReportMilestone {
                report_id,
                position: i as i32,
                title: item.title,
                due_on: item.due_on,
                status: item.status,
            })
            .collect();

        diesel::insert_into(report_milestones::table)
            .values(&rows)
            .execute(conn)?;

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, report_id = %report_id, "Failed to replace milestones");
        ApiError::internal("Failed to save section", "SECTION_SAVE_ERROR")
    })
}

fn replace_raid_items(
    conn: &mut PgConnection,
    report_id: Uuid,
    items: Vec<RaidItem>,
) -> ApiResult<()> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(report_raid_items::table.filter(report_raid_items::report_id.eq(report_id)))
            .execute(conn)?;

        let rows: Vec<NewReportRaidItem> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| NewReportRaidItem {
                report_id,
                position: i as i32,
                kind: item.kind,
                description: item.description,
                severity: item.severity,
                owner: item.owner,
            })
            .collect();

        diesel::insert_into(report_raid_items::table)
            .values(&rows)
            .execute(conn)?;

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, report_id = %report_id, "Failed to replace RAID items");
        ApiError::internal("Failed to save section", "SECTION_SAVE_ERROR")
    })
}

fn replace_vendor_resources(
    conn: &mut PgConnection,
    report_id: Uuid,
    items: Vec<VendorResourceItem>,
) -> ApiResult<()> {
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(
            report_vendor_resources::table
                .filter(report_vendor_resources::report_id.eq(report_id)),
        )
        .execute(conn)?;

        let rows: Vec<NewReportVendorResource> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| NewReportVendorResource {
                report_id,
                position: i as i32,
                role_name: item.role_name,
                headcount: item.headcount,
                notes: item.notes,
            })
            .collect();

        diesel::insert_into(report_vendor_resources::table)
            .values(&rows)
            .execute(conn)?;

        Ok(())
    })
    .map_err(|e| {
        error!(error = %e, report_id = %report_id, "Failed to replace vendor resources");
        ApiError::internal("Failed to save section", "SECTION_SAVE_ERROR")
    })
}

#[utoipa::path(
    post,
    path = "/api/reports/{report_id}/submit",
    tag = "Weekly Reports",
    params(("report_id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report submitted", body = Envelope<WeeklyReport>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 404, description = "Report not found", body = ApiError),
        (status = 409, description = "Report already submitted", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn submit_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
) -> ApiResult<Json<Envelope<WeeklyReport>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::REPORTS, Level::Write)?;

    let report: WeeklyReport = weekly_reports::table
        .filter(weekly_reports::id.eq(report_id))
        .first(&mut conn)
        .map_err(|_| ApiError::not_found("Report not found", "REPORT_NOT_FOUND"))?;

    if report.status != "draft" {
        return Err(ApiError::conflict(
            "Report has already been submitted",
            "REPORT_SUBMITTED",
        ));
    }

    let now = Utc::now().naive_utc();

    let submitted: WeeklyReport =
        diesel::update(weekly_reports::table.filter(weekly_reports::id.eq(report_id)))
            .set((
                weekly_reports::status.eq("submitted"),
                weekly_reports::submitted_at.eq(Some(now)),
                weekly_reports::updated_at.eq(now),
            ))
            .get_result(&mut conn)
            .map_err(|_| ApiError::db_error())?;

    info!(report_id = %report_id, submitted_by = %actor.id, "Weekly report submitted");

    Ok(Envelope::new(submitted))
}
