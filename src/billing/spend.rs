//! Expected-spend calculation and tolerance classification.
//!
//! Expected spend for an invoice period is the sum over timesheet entries of
//! hours x the rate card effective on the work date, aggregated per team
//! member. The comparison against the invoiced amount is a single pass:
//! discrepancy, discrepancy percent, and an inclusive tolerance check.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::RateCard;

#[derive(Debug, Serialize, ToSchema)]
pub struct SpendLine {
    pub team_member_id: Uuid,
    pub display_name: String,
    #[schema(value_type = String, example = "37.5")]
    pub hours: Decimal,
    #[schema(value_type = String, example = "85.00")]
    pub hourly_rate: Decimal,
    #[schema(example = "EUR")]
    pub rate_currency: String,
    /// Line amount converted into the invoice currency.
    #[schema(value_type = String, example = "3187.50")]
    pub amount: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnratedMember {
    pub team_member_id: Uuid,
    pub display_name: String,
    #[schema(value_type = String, example = "12.0")]
    pub hours: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SpendValidation {
    #[schema(value_type = String, example = "41250.00")]
    pub invoiced_amount: Decimal,
    #[schema(value_type = String, example = "40000.00")]
    pub expected_amount: Decimal,
    #[schema(value_type = String, example = "1250.00")]
    pub discrepancy: Decimal,
    /// None when the expected amount is zero.
    #[schema(value_type = Option<String>, example = "3.125")]
    pub discrepancy_percent: Option<Decimal>,
    pub within_tolerance: bool,
    #[schema(value_type = String, example = "5.0")]
    pub tolerance_percent: Decimal,
    pub breakdown: Vec<SpendLine>,
    pub unrated_members: Vec<UnratedMember>,
}

/// The rate card applicable to `role_id` on `on`: effective window contains
/// the date; the most recently effective card wins when several match.
pub fn applicable_rate<'a>(
    cards: &'a [RateCard],
    role_id: Uuid,
    on: NaiveDate,
) -> Option<&'a RateCard> {
    cards
        .iter()
        .filter(|c| c.role_id == role_id)
        .filter(|c| c.effective_from <= on)
        .filter(|c| c.effective_to.map(|to| to >= on).unwrap_or(true))
        .max_by_key(|c| c.effective_from)
}

/// Classifies an invoiced amount against the expected spend.
///
/// Returns (discrepancy, discrepancy_percent, within_tolerance). The
/// tolerance check is inclusive. When expected is zero the percent is
/// undefined and the invoice is within tolerance only if it is also zero.
pub fn evaluate(
    invoiced: Decimal,
    expected: Decimal,
    tolerance_percent: Decimal,
) -> (Decimal, Option<Decimal>, bool) {
    let discrepancy = invoiced - expected;

    if expected.is_zero() {
        return (discrepancy, None, invoiced.is_zero());
    }

    let percent = discrepancy / expected * Decimal::from(100);
    let within = percent.abs() <= tolerance_percent;
    (discrepancy, Some(percent), within)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn card(
        role_id: Uuid,
        rate: Decimal,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> RateCard {
        RateCard {
            id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            role_id,
            hourly_rate: rate,
            currency: "EUR".to_string(),
            effective_from: from,
            effective_to: to,
            created_at: date(2026, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_discrepancy_arithmetic() {
        let (disc, pct, within) = evaluate(dec!(105), dec!(100), dec!(5));
        assert_eq!(disc, dec!(5));
        assert_eq!(pct, Some(dec!(5)));
        assert!(within);
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let (_, _, at_boundary) = evaluate(dec!(1050), dec!(1000), dec!(5));
        assert!(at_boundary);

        let (_, pct, beyond) = evaluate(dec!(1051), dec!(1000), dec!(5));
        assert_eq!(pct, Some(dec!(5.1)));
        assert!(!beyond);
    }

    #[test]
    fn test_undercharge_uses_absolute_percent() {
        let (disc, pct, within) = evaluate(dec!(90), dec!(100), dec!(5));
        assert_eq!(disc, dec!(-10));
        assert_eq!(pct, Some(dec!(-10)));
        assert!(!within);

        let (_, _, within) = evaluate(dec!(96), dec!(100), dec!(5));
        assert!(within);
    }

    #[test]
    fn test_zero_expected_spend() {
        let (disc, pct, within) = evaluate(dec!(0), dec!(0), dec!(5));
        assert_eq!(disc, dec!(0));
        assert_eq!(pct, None);
        assert!(within);

        let (disc, pct, within) = evaluate(dec!(500), dec!(0), dec!(5));
        assert_eq!(disc, dec!(500));
        assert_eq!(pct, None);
        assert!(!within);
    }

    #[test]
    fn test_applicable_rate_respects_effective_window() {
        let role = Uuid::new_v4();
        let cards = vec![
            card(role, dec!(80), date(2026, 1, 1), Some(date(2026, 3, 31))),
            card(role, dec!(90), date(2026, 4, 1), None),
        ];

        assert_eq!(
            applicable_rate(&cards, role, date(2026, 2, 15)).unwrap().hourly_rate,
            dec!(80)
        );
        assert_eq!(
            applicable_rate(&cards, role, date(2026, 6, 1)).unwrap().hourly_rate,
            dec!(90)
        );
        assert!(applicable_rate(&cards, role, date(2025, 12, 31)).is_none());
    }

    #[test]
    fn test_applicable_rate_most_recent_wins() {
        let role = Uuid::new_v4();
        let cards = vec![
            card(role, dec!(80), date(2026, 1, 1), None),
            card(role, dec!(95), date(2026, 5, 1), None),
        ];

        assert_eq!(
            applicable_rate(&cards, role, date(2026, 6, 1)).unwrap().hourly_rate,
            dec!(95)
        );
    }

    #[test]
    fn test_applicable_rate_ignores_other_roles() {
        let role = Uuid::new_v4();
        let cards = vec![card(Uuid::new_v4(), dec!(80), date(2026, 1, 1), None)];
        assert!(applicable_rate(&cards, role, date(2026, 6, 1)).is_none());
    }
}
