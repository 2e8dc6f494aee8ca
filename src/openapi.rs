//! OpenAPI documentation configuration.
//!
//! Generates the OpenAPI specification with `utoipa` and serves it via
//! Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cadence API",
        version = "1.0.0",
        description = "Internal delivery operations service: vendors, contracts, invoices, \
        timesheets, rate cards, exchange rates, weekly delivery reports, and role-based \
        access control.\n\n\
        ## Authentication\n\
        Most endpoints require a JWT bearer token from `/api/auth/login`.\n\n\
        ## Permissions\n\
        Every user carries a permission level (`denied < view < write < admin`). Non-admin \
        users additionally need the target resource key granted to them directly or through \
        a permission group.",
        contact(
            name = "Cadence API Support"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "Login, tokens, invitations, password reset"),
        (name = "Users", description = "User management and invitations"),
        (name = "Vendors", description = "Vendor records and tags"),
        (name = "Contracts", description = "Vendor contracts"),
        (name = "Roles", description = "Job roles"),
        (name = "Team Members", description = "Vendor team assignments"),
        (name = "Rate Cards", description = "Hourly rates per vendor and role"),
        (name = "Exchange Rates", description = "Currency conversion rates"),
        (name = "Timesheets", description = "Timesheet entries"),
        (name = "Invoices", description = "Invoices and spend validation"),
        (name = "Weekly Reports", description = "Weekly delivery reports"),
        (name = "Access Control", description = "Permission groups and resource grants"),
        (name = "Imports", description = "CSV bulk import")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::auth::login,
        crate::handlers::auth::refresh_token,
        crate::handlers::auth::logout,
        crate::handlers::auth::get_current_user,
        crate::handlers::auth::forgot_password,
        crate::handlers::auth::reset_password,
        crate::handlers::auth::accept_invitation,

        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::invite_user,
        crate::handlers::users::revoke_invitation,
        crate::handlers::users::update_user,
        crate::handlers::users::get_user_audit_log,

        crate::handlers::vendors::create_vendor,
        crate::handlers::vendors::list_vendors,
        crate::handlers::vendors::get_vendor,
        crate::handlers::vendors::update_vendor,
        crate::handlers::vendors::set_vendor_tags,

        crate::handlers::contracts::create_contract,
        crate::handlers::contracts::list_contracts,
        crate::handlers::contracts::get_contract,
        crate::handlers::contracts::update_contract,

        crate::handlers::roles::create_role,
        crate::handlers::roles::list_roles,
        crate::handlers::roles::update_role,
        crate::handlers::roles::delete_role,

        crate::handlers::team_members::create_team_member,
        crate::handlers::team_members::list_team_members,
        crate::handlers::team_members::get_team_member,
        crate::handlers::team_members::update_team_member,

        crate::handlers::rate_cards::create_rate_card,
        crate::handlers::rate_cards::list_rate_cards,
        crate::handlers::rate_cards::delete_rate_card,

        crate::handlers::exchange_rates::create_exchange_rate,
        crate::handlers::exchange_rates::list_exchange_rates,
        crate::handlers::exchange_rates::latest_exchange_rate,

        crate::handlers::timesheets::create_timesheet_entry,
        crate::handlers::timesheets::list_timesheet_entries,
        crate::handlers::timesheets::delete_timesheet_entry,

        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::update_invoice,
        crate::handlers::invoices::set_invoice_status,
        crate::handlers::invoices::validate_invoice,

        crate::handlers::reports::create_report,
        crate::handlers::reports::list_reports,
        crate::handlers::reports::get_report,
        crate::handlers::reports::update_report,
        crate::handlers::reports::save_report_section,
        crate::handlers::reports::submit_report,

        crate::handlers::access::create_group,
        crate::handlers::access::list_groups,
        crate::handlers::access::delete_group,
        crate::handlers::access::add_group_member,
        crate::handlers::access::remove_group_member,
        crate::handlers::access::create_grant,
        crate::handlers::access::list_grants,
        crate::handlers::access::delete_grant,
        crate::handlers::access::get_user_resources,
        crate::handlers::access::check_access,

        crate::handlers::imports::import_timesheets,
    ),
    components(
        schemas(
            ApiError,
            PaginationMeta,

            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::RefreshRequest,
            crate::handlers::auth::UserResponse,
            crate::handlers::auth::AuthData,
            crate::handlers::auth::RefreshData,
            crate::handlers::auth::CurrentUserData,
            crate::handlers::auth::ForgotPasswordRequest,
            crate::handlers::auth::ForgotPasswordData,
            crate::handlers::auth::ResetPasswordRequest,
            crate::handlers::auth::ResetPasswordData,
            crate::handlers::auth::AcceptInvitationRequest,

            crate::handlers::users::InviteUserRequest,
            crate::handlers::users::UpdateUserRequest,
            crate::handlers::users::InvitationData,
            crate::handlers::users::UsersListData,
            crate::handlers::users::AuditLogData,
            crate::handlers::users::AuditEntryData,

            crate::models::Vendor,
            crate::handlers::vendors::CreateVendorRequest,
            crate::handlers::vendors::UpdateVendorRequest,
            crate::handlers::vendors::SetVendorTagsRequest,
            crate::handlers::vendors::VendorData,
            crate::handlers::vendors::VendorsListData,

            crate::models::Contract,
            crate::handlers::contracts::CreateContractRequest,
            crate::handlers::contracts::UpdateContractRequest,
            crate::handlers::contracts::ContractsListData,

            crate::models::Role,
            crate::handlers::roles::CreateRoleRequest,
            crate::handlers::roles::UpdateRoleRequest,
            crate::handlers::roles::RolesListData,

            crate::models::TeamMember,
            crate::handlers::team_members::CreateTeamMemberRequest,
            crate::handlers::team_members::UpdateTeamMemberRequest,
            crate::handlers::team_members::TeamMembersListData,

            crate::models::RateCard,
            crate::handlers::rate_cards::CreateRateCardRequest,
            crate::handlers::rate_cards::RateCardsListData,

            crate::models::ExchangeRate,
            crate::handlers::exchange_rates::CreateExchangeRateRequest,
            crate::handlers::exchange_rates::ExchangeRatesListData,
            crate::handlers::exchange_rates::LatestRateData,

            crate::models::TimesheetEntry,
            crate::handlers::timesheets::CreateTimesheetEntryRequest,
            crate::handlers::timesheets::TimesheetListData,

            crate::models::Invoice,
            crate::handlers::invoices::CreateInvoiceRequest,
            crate::handlers::invoices::UpdateInvoiceRequest,
            crate::handlers::invoices::InvoiceStatusRequest,
            crate::handlers::invoices::ValidateInvoiceRequest,
            crate::handlers::invoices::InvoicesListData,
            crate::handlers::invoices::InvoiceValidationData,
            crate::billing::spend::SpendLine,
            crate::billing::spend::UnratedMember,
            crate::billing::spend::SpendValidation,

            crate::models::WeeklyReport,
            crate::models::ReportAchievement,
            crate::models::ReportFocusItem,
            crate::models::ReportMilestone,
            crate::models::ReportRaidItem,
            crate::models::ReportVendorResource,
            crate::handlers::reports::CreateReportRequest,
            crate::handlers::reports::UpdateReportRequest,
            crate::handlers::reports::SectionItemsRequest,
            crate::handlers::reports::ReportsListData,
            crate::handlers::reports::ReportData,

            crate::models::PermissionGroup,
            crate::models::ResourcePermission,
            crate::handlers::access::CreateGroupRequest,
            crate::handlers::access::AddGroupMemberRequest,
            crate::handlers::access::CreateGrantRequest,
            crate::handlers::access::CheckAccessRequest,
            crate::handlers::access::GroupsListData,
            crate::handlers::access::GrantsListData,
            crate::handlers::access::UserResourcesData,
            crate::handlers::access::CheckAccessData,

            crate::handlers::imports::ImportResultData,
            crate::import::timesheets::RowError,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "JWT access token obtained from /api/auth/login.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Cadence API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_has_security_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components should exist");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn test_openapi_has_tags() {
        let spec = ApiDoc::openapi();
        let tags = spec.tags.expect("tags should exist");
        assert!(tags.iter().any(|t| t.name == "Invoices"));
        assert!(tags.iter().any(|t| t.name == "Access Control"));
        assert!(tags.iter().any(|t| t.name == "Weekly Reports"));
    }
}
