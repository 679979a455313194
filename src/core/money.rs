//! Fixed-point helpers for monetary amounts and percentages.
//!
//! Every persisted amount and percentage carries two decimal places.
//! Intermediate results keep full `Decimal` precision and are rounded
//! once, at the point where they become a stored value.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Number of decimal places kept for amounts and percentages.
pub const SCALE: u32 = 2;

/// The smallest representable amount; also the tolerance allowed between
/// an installment amount and the sum of its portions.
pub const ROUNDING_UNIT: Decimal = dec!(0.01);

/// Denominator of the civil-law simple-interest formula
/// `balance × rate% × days / 36500`.
pub const DAY_COUNT_DENOMINATOR: Decimal = dec!(36500);

/// Round half away from zero to two decimal places.
///
/// # Examples
///
/// ```
/// use repayment_engine::core::money::round2;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(round2(dec!(246.5753)), dec!(246.58));
/// assert_eq!(round2(dec!(0.005)), dec!(0.01));
/// ```
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Simple interest on `balance` at `annual_rate_percent` for `days` days.
///
/// Not rounded; callers round when the value becomes an installment field.
pub fn simple_interest(balance: Decimal, annual_rate_percent: Decimal, days: i64) -> Decimal {
    if days <= 0 || balance <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    balance * annual_rate_percent * Decimal::from(days) / DAY_COUNT_DENOMINATOR
}

/// `true` when `a` and `b` differ by no more than one rounding unit.
pub fn within_tolerance(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= ROUNDING_UNIT
}

/// `true` for a percentage in the closed range `[0, 100]`.
pub fn is_valid_percentage(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2_midpoint_away_from_zero() {
        assert_eq!(round2(dec!(3333.335)), dec!(3333.34));
        assert_eq!(round2(dec!(3333.3333)), dec!(3333.33));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn test_simple_interest_reference_values() {
        let first = simple_interest(dec!(10000), dec!(5), 180);
        assert_eq!(round2(first), dec!(246.58));
        let second = simple_interest(dec!(5000), dec!(5), 185);
        assert_eq!(round2(second), dec!(126.71));
    }

    #[test]
    fn test_simple_interest_non_positive_days() {
        assert_eq!(simple_interest(dec!(1000), dec!(5), 0), Decimal::ZERO);
        assert_eq!(simple_interest(dec!(1000), dec!(5), -3), Decimal::ZERO);
    }

    #[test]
    fn test_percentage_range() {
        assert!(is_valid_percentage(dec!(0)));
        assert!(is_valid_percentage(dec!(100)));
        assert!(!is_valid_percentage(dec!(150)));
        assert!(!is_valid_percentage(dec!(-0.01)));
    }

    #[test]
    fn test_within_tolerance() {
        assert!(within_tolerance(dec!(10.00), dec!(10.01)));
        assert!(!within_tolerance(dec!(10.00), dec!(10.02)));
    }
}
