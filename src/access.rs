//! Permission resolution: level hierarchy plus resource/group grants.
//!
//! A user carries a permission level (`denied < view < write < admin`).
//! Super-users and admin-level users bypass resource checks. Everyone else
//! needs both a sufficient level and the resource key in their effective
//! accessible set: the union of direct grants and grants to any group they
//! belong to.

use diesel::prelude::*;
use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{ApiError, ApiResult},
    models::User,
    schema::{group_members, resource_permissions, users},
    telemetry::record_permission_check,
};

/// Resource keys known to the service. Grants referencing anything else are
/// rejected at the API layer.
pub mod resource_keys {
    pub const USERS: &str = "users";
    pub const VENDORS: &str = "vendors";
    pub const CONTRACTS: &str = "contracts";
    pub const INVOICES: &str = "invoices";
    pub const TIMESHEETS: &str = "timesheets";
    pub const TEAM_MEMBERS: &str = "team_members";
    pub const ROLES: &str = "roles";
    pub const RATE_CARDS: &str = "rate_cards";
    pub const EXCHANGE_RATES: &str = "exchange_rates";
    pub const REPORTS: &str = "reports";
    pub const ACCESS_CONTROL: &str = "access_control";

    pub const ALL: &[&str] = &[
        USERS,
        VENDORS,
        CONTRACTS,
        INVOICES,
        TIMESHEETS,
        TEAM_MEMBERS,
        ROLES,
        RATE_CARDS,
        EXCHANGE_RATES,
        REPORTS,
        ACCESS_CONTROL,
    ];

    pub fn is_known(key: &str) -> bool {
        ALL.contains(&key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Denied,
    View,
    Write,
    Admin,
}

impl Level {
    pub fn rank(self) -> u8 {
        match self {
            Level::Denied => 0,
            Level::View => 1,
            Level::Write => 2,
            Level::Admin => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Denied => "denied",
            Level::View => "view",
            Level::Write => "write",
            Level::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "denied" => Some(Level::Denied),
            "view" => Some(Level::View),
            "write" => Some(Level::Write),
            "admin" => Some(Level::Admin),
            _ => None,
        }
    }
}

pub fn has_level(level: Level, required: Level) -> bool {
    level.rank() >= required.rank()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: &'static str,
}

impl Decision {
    fn allow(reason: &'static str) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Pure resolution step. `accessible` is the user's effective resource set;
/// it is only consulted when neither bypass nor a level refusal applies.
pub fn resolve(
    level: Level,
    is_super: bool,
    resource: &str,
    required: Level,
    accessible: &HashSet<String>,
) -> Decision {
    if is_super {
        return Decision::allow("super_user");
    }
    if level == Level::Admin {
        return Decision::allow("admin_level");
    }
    if level == Level::Denied {
        return Decision::deny("level_denied");
    }
    if !has_level(level, required) {
        return Decision::deny("level_too_low");
    }
    if accessible.contains(resource) {
        Decision::allow("resource_granted")
    } else {
        Decision::deny("resource_not_granted")
    }
}

/// Union of direct grants and grants to any group the user belongs to.
pub fn accessible_resources(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> QueryResult<HashSet<String>> {
    let direct: Vec<String> = resource_permissions::table
        .filter(resource_permissions::user_id.eq(user_id))
        .select(resource_permissions::resource_key)
        .load(conn)?;

    let group_ids: Vec<Uuid> = group_members::table
        .filter(group_members::user_id.eq(user_id))
        .select(group_members::group_id)
        .load(conn)?;

    let mut set: HashSet<String> = direct.into_iter().collect();

    if !group_ids.is_empty() {
        let via_groups: Vec<String> = resource_permissions::table
            .filter(resource_permissions::group_id.eq_any(&group_ids))
            .select(resource_permissions::resource_key)
            .load(conn)?;
        set.extend(via_groups);
    }

    Ok(set)
}

pub fn check(
    conn: &mut PgConnection,
    user: &User,
    resource: &str,
    required: Level,
) -> QueryResult<Decision> {
    let level = Level::parse(&user.permission_level).unwrap_or(Level::Denied);

    // Bypasses and level refusals never need the grant set.
    if user.is_super || level == Level::Admin || level == Level::Denied
        || !has_level(level, required)
    {
        return Ok(resolve(level, user.is_super, resource, required, &HashSet::new()));
    }

    let accessible = accessible_resources(conn, user.id)?;
    Ok(resolve(level, user.is_super, resource, required, &accessible))
}

/// Loads the acting user from the claims, refuses inactive accounts, and
/// enforces the resource/level requirement. Returns the user row so handlers
/// can reuse it without a second lookup.
pub fn enforce(
    conn: &mut PgConnection,
    claims: &Claims,
    resource: &str,
    required: Level,
) -> ApiResult<User> {
    let start = std::time::Instant::now();

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid user ID in token", "INVALID_USER_ID"))?;

    let user: User = users::table
        .filter(users::id.eq(user_id))
        .first(conn)
        .map_err(|_| ApiError::unauthorized("User not found", "USER_NOT_FOUND"))?;

    if user.status != "active" {
        warn!(user_id = %user.id, status = %user.status, "Request from non-active account");
        return Err(ApiError::forbidden("Account is inactive", "ACCOUNT_INACTIVE"));
    }

    let decision = check(conn, &user, resource, required).map_err(|e| {
        tracing::error!(error = %e, "Database error resolving permissions");
        ApiError::db_error()
    })?;

    record_permission_check(decision.allowed, start.elapsed());

    if !decision.allowed {
        warn!(
            user_id = %user.id,
            resource = %resource,
            required = %required.as_str(),
            reason = %decision.reason,
            "Permission denied"
        );
        return Err(ApiError::forbidden(
            "You do not have permission to perform this action",
            "PERMISSION_DENIED",
        ));
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_LEVELS: [Level; 4] = [Level::Denied, Level::View, Level::Write, Level::Admin];

    #[test]
    fn test_has_level_matches_rank_ordering() {
        for level in ALL_LEVELS {
            for required in ALL_LEVELS {
                assert_eq!(
                    has_level(level, required),
                    level.rank() >= required.rank(),
                    "level={:?} required={:?}",
                    level,
                    required
                );
            }
        }
    }

    #[test]
    fn test_level_roundtrip() {
        for level in ALL_LEVELS {
            assert_eq!(Level::parse(level.as_str()), Some(level));
        }
        assert_eq!(Level::parse("owner"), None);
    }

    #[test]
    fn test_denied_user_refused_despite_grants() {
        let mut accessible = HashSet::new();
        for key in resource_keys::ALL {
            accessible.insert((*key).to_string());
        }

        for required in ALL_LEVELS {
            let decision = resolve(
                Level::Denied,
                false,
                resource_keys::INVOICES,
                required,
                &accessible,
            );
            assert!(!decision.allowed);
            assert_eq!(decision.reason, "level_denied");
        }
    }

    #[test]
    fn test_super_user_bypasses_everything() {
        let decision = resolve(
            Level::Denied,
            true,
            resource_keys::ACCESS_CONTROL,
            Level::Admin,
            &HashSet::new(),
        );
        assert!(decision.allowed);
        assert_eq!(decision.reason, "super_user");
    }

    #[test]
    fn test_admin_level_bypasses_resource_set() {
        let decision = resolve(
            Level::Admin,
            false,
            resource_keys::VENDORS,
            Level::Write,
            &HashSet::new(),
        );
        assert!(decision.allowed);
        assert_eq!(decision.reason, "admin_level");
    }

    #[test]
    fn test_resource_membership_required() {
        let mut accessible = HashSet::new();
        accessible.insert(resource_keys::VENDORS.to_string());

        let granted = resolve(
            Level::Write,
            false,
            resource_keys::VENDORS,
            Level::Write,
            &accessible,
        );
        assert!(granted.allowed);
        assert_eq!(granted.reason, "resource_granted");

        let refused = resolve(
            Level::Write,
            false,
            resource_keys::INVOICES,
            Level::Write,
            &accessible,
        );
        assert!(!refused.allowed);
        assert_eq!(refused.reason, "resource_not_granted");
    }

    #[test]
    fn test_insufficient_level_refused_before_resource_lookup() {
        let mut accessible = HashSet::new();
        accessible.insert(resource_keys::INVOICES.to_string());

        let decision = resolve(
            Level::View,
            false,
            resource_keys::INVOICES,
            Level::Write,
            &accessible,
        );
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "level_too_low");
    }

    #[test]
    fn test_known_resource_keys() {
        assert!(resource_keys::is_known("invoices"));
        assert!(resource_keys::is_known("access_control"));
        assert!(!resource_keys::is_known("payroll"));
    }
}
