//! Exchange rate handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    access::{enforce, resource_keys, Level},
    auth::jwt::Claims,
    billing::fx,
    error::{get_db_conn, ApiError, ApiResult, Envelope},
    models::{ExchangeRate, NewExchangeRate},
    pagination::{PaginationMeta, PaginationParams},
    schema::exchange_rates,
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateExchangeRateRequest {
    #[schema(example = "USD")]
    pub base_currency: String,
    #[schema(example = "EUR")]
    pub quote_currency: String,
    #[schema(value_type = String, example = "0.92")]
    pub rate: Decimal,
    pub effective_on: NaiveDate,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExchangeRateFilter {
    pub base_currency: Option<String>,
    pub quote_currency: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LatestRateQuery {
    #[param(example = "USD")]
    pub base_currency: String,
    #[param(example = "EUR")]
    pub quote_currency: String,
    /// Defaults to today.
    pub on: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExchangeRatesListData {
    pub data: Vec<ExchangeRate>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LatestRateData {
    pub base_currency: String,
    pub quote_currency: String,
    #[schema(value_type = Option<String>, example = "0.92")]
    pub rate: Option<Decimal>,
    pub on: NaiveDate,
}

#[utoipa::path(
    post,
    path = "/api/exchange-rates",
    tag = "Exchange Rates",
    request_body = CreateExchangeRateRequest,
    responses(
        (status = 201, description = "Exchange rate recorded", body = Envelope<ExchangeRate>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 409, description = "Rate already recorded for this pair and date", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_exchange_rate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExchangeRateRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<ExchangeRate>>)> {
    if payload.base_currency.len() != 3 || payload.quote_currency.len() != 3 {
        return Err(ApiError::bad_request(
            "Currencies must be 3-letter codes",
            "INVALID_CURRENCY",
        ));
    }

    if payload.base_currency.eq_ignore_ascii_case(&payload.quote_currency) {
        return Err(ApiError::bad_request(
            "Base and quote currencies must differ",
            "INVALID_CURRENCY_PAIR",
        ));
    }

    if payload.rate <= Decimal::ZERO {
        return Err(ApiError::bad_request(
            "Rate must be positive",
            "INVALID_RATE",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let actor = enforce(&mut conn, &claims, resource_keys::EXCHANGE_RATES, Level::Write)?;

    let rate: ExchangeRate = diesel::insert_into(exchange_rates::table)
        .values(&NewExchangeRate {
            base_currency: payload.base_currency.to_uppercase(),
            quote_currency: payload.quote_currency.to_uppercase(),
            rate: payload.rate,
            effective_on: payload.effective_on,
        })
        .get_result(&mut conn)
        .map_err(|e| {
            warn!(error = %e, "Failed to record exchange rate");
            ApiError::conflict(
                "A rate for this pair and date already exists",
                "EXCHANGE_RATE_EXISTS",
            )
        })?;

    info!(
        base = %rate.base_currency,
        quote = %rate.quote_currency,
        effective_on = %rate.effective_on,
        recorded_by = %actor.id,
        "Recorded exchange rate"
    );

    Ok((StatusCode::CREATED, Envelope::new(rate)))
}

#[utoipa::path(
    get,
    path = "/api/exchange-rates",
    tag = "Exchange Rates",
    params(PaginationParams, ExchangeRateFilter),
    responses(
        (status = 200, description = "Paginated list of exchange rates", body = Envelope<ExchangeRatesListData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_exchange_rates(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ExchangeRateFilter>,
) -> ApiResult<Json<Envelope<ExchangeRatesListData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::EXCHANGE_RATES, Level::View)?;

    let mut count_query = exchange_rates::table.into_boxed();
    let mut list_query = exchange_rates::table.into_boxed();

    if let Some(ref base) = filter.base_currency {
        let base = base.to_uppercase();
        count_query = count_query.filter(exchange_rates::base_currency.eq(base.clone()));
        list_query = list_query.filter(exchange_rates::base_currency.eq(base));
    }
    if let Some(ref quote) = filter.quote_currency {
        let quote = quote.to_uppercase();
        count_query = count_query.filter(exchange_rates::quote_currency.eq(quote.clone()));
        list_query = list_query.filter(exchange_rates::quote_currency.eq(quote));
    }

    let total_count: i64 = count_query
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<ExchangeRate> = list_query
        .order(exchange_rates::effective_on.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(ExchangeRatesListData {
        data: rows,
        pagination: pagination.into_metadata(total_count),
    }))
}

#[utoipa::path(
    get,
    path = "/api/exchange-rates/latest",
    tag = "Exchange Rates",
    params(LatestRateQuery),
    responses(
        (status = 200, description = "Latest rate effective on or before the date", body = Envelope<LatestRateData>),
        (status = 403, description = "Permission denied", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn latest_exchange_rate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<LatestRateQuery>,
) -> ApiResult<Json<Envelope<LatestRateData>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    enforce(&mut conn, &claims, resource_keys::EXCHANGE_RATES, Level::View)?;

    let on = query
        .on
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let base = query.base_currency.to_uppercase();
    let quote = query.quote_currency.to_uppercase();

    let rate = fx::rate_on_or_before(&mut conn, &base, &quote, on)
        .map_err(|_| ApiError::db_error())?;

    Ok(Envelope::new(LatestRateData {
        base_currency: base,
        quote_currency: quote,
        rate,
        on,
    }))
}
