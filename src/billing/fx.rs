//! Exchange-rate lookup.

use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::schema::exchange_rates;

/// Latest stored rate effective on or before `on`, if any.
pub fn rate_on_or_before(
    conn: &mut PgConnection,
    base: &str,
    quote: &str,
    on: NaiveDate,
) -> QueryResult<Option<Decimal>> {
    exchange_rates::table
        .filter(exchange_rates::base_currency.eq(base))
        .filter(exchange_rates::quote_currency.eq(quote))
        .filter(exchange_rates::effective_on.le(on))
        .order(exchange_rates::effective_on.desc())
        .select(exchange_rates::rate)
        .first(conn)
        .optional()
}

/// Converts `amount` from `from` into `to` using the latest rate effective
/// on or before `on`. Identity when the currencies match; `None` when no
/// rate is stored.
pub fn convert(
    conn: &mut PgConnection,
    amount: Decimal,
    from: &str,
    to: &str,
    on: NaiveDate,
) -> QueryResult<Option<Decimal>> {
    if from.eq_ignore_ascii_case(to) {
        return Ok(Some(amount));
    }

    let rate = rate_on_or_before(conn, &from.to_uppercase(), &to.to_uppercase(), on)?;
    Ok(rate.map(|r| amount * r))
}
