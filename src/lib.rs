//! Cadence - delivery operations service: vendors, contracts, invoices,
//! timesheets, weekly reports, and role-based access control.

pub mod access;
pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod handlers;
pub mod import;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod schema;
pub mod seed;
pub mod telemetry;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::jwt::JwtConfig;
use auth::password::PasswordPolicy;
use config::{BillingConfig, TokenConfig};
use middleware::{
    metrics::metrics_middleware,
    rate_limit::{
        auth_rate_limit_middleware, rate_limit_middleware, RateLimitConfig, RateLimitState,
    },
    request_id::request_id_middleware,
};
use telemetry::MetricsState;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub rate_limit: RateLimitState,
    pub jwt_config: Arc<JwtConfig>,
    pub password_policy: PasswordPolicy,
    pub password_hash_cost: u32,
    pub rotate_refresh_tokens: bool,
    pub token_config: TokenConfig,
    pub billing_config: BillingConfig,
    pub metrics: MetricsState,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: &Config) -> Self {
        let rate_limit = if config.security.rate_limiting_enabled {
            RateLimitState::with_config(
                RateLimitConfig::new(config.security.rate_limit_requests_per_minute, 60),
                RateLimitConfig::auth(),
            )
        } else {
            RateLimitState::disabled()
        };

        let jwt_config = JwtConfig::from_env_with_expiry(
            config.jwt.access_token_expiry_secs,
            config.jwt.refresh_token_expiry_secs,
            config.jwt.issuer.clone(),
            config.jwt.audience.clone(),
        );

        let password_policy = if config.security.require_password_complexity {
            PasswordPolicy::complex(config.security.min_password_length)
        } else {
            PasswordPolicy {
                min_length: config.security.min_password_length,
                ..Default::default()
            }
        };

        let metrics = MetricsState::new(config.telemetry.metrics_enabled);

        Self {
            db_pool,
            rate_limit,
            jwt_config: Arc::new(jwt_config),
            password_policy,
            password_hash_cost: config.security.password_hash_cost,
            rotate_refresh_tokens: config.security.rotate_refresh_tokens,
            token_config: config.tokens.clone(),
            billing_config: config.billing.clone(),
            metrics,
        }
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let rate_limit_state = state.rate_limit.clone();
    let metrics_state = state.metrics.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check_simple))
        .route("/health/status", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::ready_check))
        .route("/health/live", get(handlers::health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh_token))
        .route(
            "/api/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route(
            "/api/auth/accept-invitation",
            post(handlers::auth::accept_invitation),
        )
        .layer(axum_middleware::from_fn(auth_rate_limit_middleware))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(handlers::auth::get_current_user))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/users", get(handlers::users::list_users))
        .route("/api/users/invite", post(handlers::users::invite_user))
        .route("/api/users/{user_id}", get(handlers::users::get_user))
        .route("/api/users/{user_id}", put(handlers::users::update_user))
        .route(
            "/api/users/{user_id}/revoke-invitation",
            post(handlers::users::revoke_invitation),
        )
        .route(
            "/api/users/{user_id}/audit",
            get(handlers::users::get_user_audit_log),
        )
        .route("/api/vendors", post(handlers::vendors::create_vendor))
        .route("/api/vendors", get(handlers::vendors::list_vendors))
        .route("/api/vendors/{vendor_id}", get(handlers::vendors::get_vendor))
        .route("/api/vendors/{vendor_id}", put(handlers::vendors::update_vendor))
        .route(
            "/api/vendors/{vendor_id}/tags",
            put(handlers::vendors::set_vendor_tags),
        )
        .route("/api/contracts", post(handlers::contracts::create_contract))
        .route("/api/contracts", get(handlers::contracts::list_contracts))
        .route(
            "/api/contracts/{contract_id}",
            get(handlers::contracts::get_contract),
        )
        .route(
            "/api/contracts/{contract_id}",
            put(handlers::contracts::update_contract),
        )
        .route("/api/roles", post(handlers::roles::create_role))
        .route("/api/roles", get(handlers::roles::list_roles))
        .route("/api/roles/{role_id}", put(handlers::roles::update_role))
        .route("/api/roles/{role_id}", delete(handlers::roles::delete_role))
        .route(
            "/api/team-members",
            post(handlers::team_members::create_team_member),
        )
        .route(
            "/api/team-members",
            get(handlers::team_members::list_team_members),
        )
        .route(
            "/api/team-members/{member_id}",
            get(handlers::team_members::get_team_member),
        )
        .route(
            "/api/team-members/{member_id}",
            put(handlers::team_members::update_team_member),
        )
        .route(
            "/api/rate-cards",
            post(handlers::rate_cards::create_rate_card),
        )
        .route("/api/rate-cards", get(handlers::rate_cards::list_rate_cards))
        .route(
            "/api/rate-cards/{rate_card_id}",
            delete(handlers::rate_cards::delete_rate_card),
        )
        .route(
            "/api/exchange-rates",
            post(handlers::exchange_rates::create_exchange_rate),
        )
        .route(
            "/api/exchange-rates",
            get(handlers::exchange_rates::list_exchange_rates),
        )
        .route(
            "/api/exchange-rates/latest",
            get(handlers::exchange_rates::latest_exchange_rate),
        )
        .route(
            "/api/timesheets",
            post(handlers::timesheets::create_timesheet_entry),
        )
        .route(
            "/api/timesheets",
            get(handlers::timesheets::list_timesheet_entries),
        )
        .route(
            "/api/timesheets/{entry_id}",
            delete(handlers::timesheets::delete_timesheet_entry),
        )
        .route("/api/invoices", post(handlers::invoices::create_invoice))
        .route("/api/invoices", get(handlers::invoices::list_invoices))
        .route(
            "/api/invoices/{invoice_id}",
            get(handlers::invoices::get_invoice),
        )
        .route(
            "/api/invoices/{invoice_id}",
            put(handlers::invoices::update_invoice),
        )
        .route(
            "/api/invoices/{invoice_id}/status",
            post(handlers::invoices::set_invoice_status),
        )
        .route(
            "/api/invoices/{invoice_id}/validate",
            post(handlers::invoices::validate_invoice),
        )
        .route("/api/reports", post(handlers::reports::create_report))
        .route("/api/reports", get(handlers::reports::list_reports))
        .route("/api/reports/{report_id}", get(handlers::reports::get_report))
        .route("/api/reports/{report_id}", put(handlers::reports::update_report))
        .route(
            "/api/reports/{report_id}/sections/{section}",
            put(handlers::reports::save_report_section),
        )
        .route(
            "/api/reports/{report_id}/submit",
            post(handlers::reports::submit_report),
        )
        .route("/api/access/groups", post(handlers::access::create_group))
        .route("/api/access/groups", get(handlers::access::list_groups))
        .route(
            "/api/access/groups/{group_id}",
            delete(handlers::access::delete_group),
        )
        .route(
            "/api/access/groups/{group_id}/members",
            post(handlers::access::add_group_member),
        )
        .route(
            "/api/access/groups/{group_id}/members/{user_id}",
            delete(handlers::access::remove_group_member),
        )
        .route(
            "/api/access/permissions",
            post(handlers::access::create_grant),
        )
        .route("/api/access/permissions", get(handlers::access::list_grants))
        .route(
            "/api/access/permissions/{grant_id}",
            delete(handlers::access::delete_grant),
        )
        .route(
            "/api/access/users/{user_id}/resources",
            get(handlers::access::get_user_resources),
        )
        .route("/api/access/check", post(handlers::access::check_access))
        .route(
            "/api/imports/timesheets",
            post(handlers::imports::import_timesheets),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .with_state(state.clone());

    let docs_routes = openapi::swagger_router();

    Router::new()
        .merge(docs_routes)
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(rate_limit_state))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"success": false, "error": "Not found", "code": "NOT_FOUND"})),
    )
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    if config.cors.allow_credentials && is_wildcard_origin {
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
            .max_age(Duration::from_secs(config.cors.max_age_secs))
    } else if config.cors.allow_credentials {
        let origins: Vec<_> = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
            .max_age(Duration::from_secs(config.cors.max_age_secs))
    } else {
        let cors = if is_wildcard_origin {
            CorsLayer::new().allow_origin(Any)
        } else {
            let origins: Vec<_> = config
                .cors
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(false)
            .max_age(Duration::from_secs(config.cors.max_age_secs))
    }
}

pub fn create_db_pool(config: &config::Config) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn create_db_pool_with_url(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(10)
        .min_idle(Some(2))
        .connection_timeout(Duration::from_secs(30))
        .idle_timeout(Some(Duration::from_secs(600)))
        .build(manager)
        .expect("Failed to create database pool")
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_build_cors_layer_wildcard() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec!["*".to_string()];
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_specific_origins() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec![
            "http://localhost:3000".to_string(),
            "https://ops.example.com".to_string(),
        ];
        let _ = build_cors_layer(&config);
    }
}
