//! CSV bulk-import handlers.

use axum::{extract::State, Extension, Json};
use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    import::timesheets::{parse_file, ImportError, RowError},
    models::NewTimesheetEntry,
    schema::{team_members, timesheet_entries},
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ImportResultData {
    pub imported: usize,
    pub skipped_duplicates: usize,
    pub errors: Vec<RowError>,
}

/// Bulk-imports timesheet entries from a CSV document. Headers are resolved
/// through an alias dictionary; rows duplicating an existing entry or an
/// earlier row in the same file are skipped and counted.
#[utoipa::path(
    post,
    path = "/api/imports/timesheets",
    tag = "Imports",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 200, description = "Import summary", body = Envelope<ImportResultData>),
        (status = 400, description = "Malformed CSV or unmappable headers", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn import_timesheets(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: String,
) -> ApiResult<Json<Envelope<ImportResultData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::TIMESHEETS, Level::Write)?;

    let parsed = parse_file(&body).map_err(|e| match e {
        ImportError::Empty => ApiError::bad_request("CSV file is empty", "EMPTY_FILE"),
        ImportError::MissingColumns(_) => {
            ApiError::bad_request(e.to_string(), "UNMAPPABLE_HEADERS")
        }
        ImportError::Malformed(_) => ApiError::bad_request(e.to_string(), "MALFORMED_CSV"),
    })?;

    let mut errors = parsed.errors;
    let mut skipped_duplicates = parsed.file_duplicates.len();

    // Resolve member emails in one query; unknown emails become row errors.
    let emails: Vec<String> = parsed
        .rows
        .iter()
        .map(|r| r.member_email.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let members: Vec<(Uuid, Uuid, String, String)> = team_members::table
        .filter(team_members::email.eq_any(&emails))
        .select((
            team_members::id,
            team_members::vendor_id,
            team_members::email,
            team_members::status,
        ))
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let member_by_email: HashMap<String, (Uuid, Uuid, String)> = members
        .into_iter()
        .map(|(id, vendor_id, email, status)| (email, (id, vendor_id, status)))
        .collect();

    let mut candidates: Vec<(Uuid, Uuid, NaiveDate, Decimal, Option<String>, usize)> = Vec::new();

    for row in parsed.rows {
        match member_by_email.get(&row.member_email) {
            Some((member_id, vendor_id, status)) if status == "active" => {
                candidates.push((
                    *member_id,
                    *vendor_id,
                    row.work_date,
                    row.hours,
                    row.notes,
                    row.line,
                ));
            }
            Some(_) => errors.push(RowError {
                line: row.line,
                message: format!("team member {} is inactive", row.member_email),
            }),
            None => errors.push(RowError {
                line: row.line,
                message: format!("no team member with email {}", row.member_email),
            }),
        }
    }

    // Duplicate detection against entries already in the database.
    let member_ids: Vec<Uuid> = candidates
        .iter()
        .map(|c| c.0)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let existing: HashSet<(Uuid, NaiveDate)> = if member_ids.is_empty() {
        HashSet::new()
    } else {
        timesheet_entries::table
            .filter(timesheet_entries::team_member_id.eq_any(&member_ids))
            .select((timesheet_entries::team_member_id, timesheet_entries::work_date))
            .load::<(Uuid, NaiveDate)>(&mut conn)
            .map_err(|_| ApiError::db_error())?
            .into_iter()
            .collect()
    };

    let mut new_entries: Vec<NewTimesheetEntry> = Vec::new();
    for (member_id, vendor_id, work_date, hours, notes, _line) in candidates {
        if existing.contains(&(member_id, work_date)) {
            skipped_duplicates += 1;
            continue;
        }
        new_entries.push(NewTimesheetEntry {
            team_member_id: member_id,
            vendor_id,
            work_date,
            hours,
            notes,
        });
    }

    let imported = new_entries.len();

    if !new_entries.is_empty() {
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::insert_into(timesheet_entries::table)
                .values(&new_entries)
                .execute(conn)?;
            Ok(())
        })
        .map_err(|e| {
            error!(error = %e, "Failed to import timesheet entries");
            ApiError::internal("Failed to import timesheet entries", "IMPORT_ERROR")
        })?;
    }

    info!(
        imported,
        skipped_duplicates,
        row_errors = errors.len(),
        imported_by = %actor.id,
        "Timesheet CSV import completed"
    );

    Ok(Envelope::new(ImportResultData {
        imported,
        skipped_duplicates,
        errors,
    }))
}
