use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub permission_level: String,
    pub is_super: bool,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub permission_level: String,
    pub is_super: bool,
    pub status: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::vendors)]
pub struct Vendor {
    pub id: Uuid,
    #[schema(example = "Acme Consulting")]
    pub name: String,
    #[schema(example = "acme-consulting")]
    pub slug: String,
    #[schema(example = "active")]
    pub status: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub country: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::vendors)]
pub struct NewVendor {
    pub name: String,
    pub slug: String,
    pub status: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::tags)]
pub struct Tag {
    pub id: Uuid,
    #[schema(example = "offshore")]
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::tags)]
pub struct NewTag {
    pub name: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::vendor_tags)]
pub struct NewVendorTag {
    pub vendor_id: Uuid,
    pub tag_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::contracts)]
pub struct Contract {
    pub id: Uuid,
    pub vendor_id: Uuid,
    #[schema(example = "Platform delivery 2026")]
    pub title: String,
    #[schema(example = "CTR-2026-014")]
    pub reference: String,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    #[schema(value_type = String, example = "250000.00")]
    pub value: Decimal,
    #[schema(example = "EUR")]
    pub currency: String,
    #[schema(example = "active")]
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::contracts)]
pub struct NewContract {
    pub vendor_id: Uuid,
    pub title: String,
    pub reference: String,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub value: Decimal,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::roles)]
pub struct Role {
    pub id: Uuid,
    #[schema(example = "Senior Engineer")]
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::roles)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::team_members)]
pub struct TeamMember {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub role_id: Uuid,
    #[schema(example = "Dana Petrov")]
    pub display_name: String,
    #[schema(example = "dana.petrov@acme.example")]
    pub email: String,
    #[schema(example = "active")]
    pub status: String,
    pub starts_on: NaiveDate,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::team_members)]
pub struct NewTeamMember {
    pub user_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub role_id: Uuid,
    pub display_name: String,
    pub email: String,
    pub status: String,
    pub starts_on: NaiveDate,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::rate_cards)]
pub struct RateCard {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub role_id: Uuid,
    #[schema(value_type = String, example = "85.00")]
    pub hourly_rate: Decimal,
    #[schema(example = "EUR")]
    pub currency: String,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::rate_cards)]
pub struct NewRateCard {
    pub vendor_id: Uuid,
    pub role_id: Uuid,
    pub hourly_rate: Decimal,
    pub currency: String,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::timesheet_entries)]
pub struct TimesheetEntry {
    pub id: Uuid,
    pub team_member_id: Uuid,
    pub vendor_id: Uuid,
    pub work_date: NaiveDate,
    #[schema(value_type = String, example = "7.5")]
    pub hours: Decimal,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::timesheet_entries)]
pub struct NewTimesheetEntry {
    pub team_member_id: Uuid,
    pub vendor_id: Uuid,
    pub work_date: NaiveDate,
    pub hours: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::exchange_rates)]
pub struct ExchangeRate {
    pub id: Uuid,
    #[schema(example = "USD")]
    pub base_currency: String,
    #[schema(example = "EUR")]
    pub quote_currency: String,
    #[schema(value_type = String, example = "0.92")]
    pub rate: Decimal,
    pub effective_on: NaiveDate,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::exchange_rates)]
pub struct NewExchangeRate {
    pub base_currency: String,
    pub quote_currency: String,
    pub rate: Decimal,
    pub effective_on: NaiveDate,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::invoices)]
pub struct Invoice {
    pub id: Uuid,
    pub vendor_id: Uuid,
    #[schema(example = "INV-2026-0192")]
    pub invoice_number: String,
    #[schema(example = "EUR")]
    pub currency: String,
    #[schema(value_type = String, example = "41250.00")]
    pub amount: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[schema(example = "received")]
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::invoices)]
pub struct NewInvoice {
    pub vendor_id: Uuid,
    pub invoice_number: String,
    pub currency: String,
    pub amount: Decimal,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::weekly_reports)]
pub struct WeeklyReport {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub week_start: NaiveDate,
    #[schema(example = "amber")]
    pub rag_status: String,
    pub summary: Option<String>,
    #[schema(example = "draft")]
    pub status: String,
    pub submitted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::weekly_reports)]
pub struct NewWeeklyReport {
    pub vendor_id: Uuid,
    pub week_start: NaiveDate,
    pub rag_status: String,
    pub summary: Option<String>,
    pub status: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::report_achievements)]
pub struct ReportAchievement {
    pub id: Uuid,
    pub report_id: Uuid,
    pub position: i32,
    pub description: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::report_achievements)]
pub struct NewReportAchievement {
    pub report_id: Uuid,
    pub position: i32,
    pub description: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::report_focus_items)]
pub struct ReportFocusItem {
    pub id: Uuid,
    pub report_id: Uuid,
    pub position: i32,
    pub description: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::report_focus_items)]
pub struct NewReportFocusItem {
    pub report_id: Uuid,
    pub position: i32,
    pub description: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::report_milestones)]
pub struct ReportMilestone {
    pub id: Uuid,
    pub report_id: Uuid,
    pub position: i32,
    #[schema(example = "UAT sign-off")]
    pub title: String,
    pub due_on: Option<NaiveDate>,
    #[schema(example = "on_track")]
    pub status: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::report_milestones)]
pub struct NewReportMilestone {
    pub report_id: Uuid,
    pub position: i32,
    pub title: String,
    pub due_on: Option<NaiveDate>,
    pub status: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::report_raid_items)]
pub struct ReportRaidItem {
    pub id: Uuid,
    pub report_id: Uuid,
    pub position: i32,
    #[schema(example = "risk")]
    pub kind: String,
    pub description: String,
    #[schema(example = "high")]
    pub severity: String,
    pub owner: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::report_raid_items)]
pub struct NewReportRaidItem {
    pub report_id: Uuid,
    pub position: i32,
    pub kind: String,
    pub description: String,
    pub severity: String,
    pub owner: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::report_vendor_resources)]
pub struct ReportVendorResource {
    pub id: Uuid,
    pub report_id: Uuid,
    pub position: i32,
    #[schema(example = "QA Engineer")]
    pub role_name: String,
    pub headcount: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::report_vendor_resources)]
pub struct NewReportVendorResource {
    pub report_id: Uuid,
    pub position: i32,
    pub role_name: String,
    pub headcount: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::permission_groups)]
pub struct PermissionGroup {
    pub id: Uuid,
    #[schema(example = "delivery-managers")]
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::permission_groups)]
pub struct NewPermissionGroup {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::group_members)]
pub struct NewGroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::resource_permissions)]
pub struct ResourcePermission {
    pub id: Uuid,
    #[schema(example = "invoices")]
    pub resource_key: String,
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::resource_permissions)]
pub struct NewResourcePermission {
    pub resource_key: String,
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::account_tokens)]
pub struct AccountToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub kind: String,
    pub expires_at: NaiveDateTime,
    pub used_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::account_tokens)]
pub struct NewAccountToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub kind: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::invitation_audit_log)]
pub struct InvitationAuditEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::invitation_audit_log)]
pub struct NewInvitationAuditEntry {
    pub user_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub detail: Option<String>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = crate::schema::refresh_tokens)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: NaiveDateTime,
}
