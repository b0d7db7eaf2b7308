//! Numeric normalization shared by the conflict resolver and the
//! extraction writer.
//!
//! Extracted values arrive as display strings ("$1,234.56", "5.5%",
//! "1,200"). Everything that compares or persists numbers funnels
//! through this module so the two subsystems cannot drift apart.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Parses a display string into an exact decimal, stripping currency
/// symbols, thousands separators, percent signs, and whitespace.
///
/// Returns `None` for anything that is not numeric after cleaning.
///
/// # Examples
///
/// ```
/// use terrafact::numeric::parse_decimal;
///
/// assert_eq!(parse_decimal("$1,234.56").unwrap().to_string(), "1234.56");
/// assert_eq!(parse_decimal("5.5%").unwrap().to_string(), "5.5");
/// assert!(parse_decimal("n/a").is_none());
/// ```
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | ' ' | '_'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<Decimal>().ok()
}

/// Returns true when the raw string parses as a number.
#[must_use]
pub fn is_numeric(raw: &str) -> bool {
    parse_decimal(raw).is_some()
}

/// Equality at 2-decimal precision, the tolerance used when deciding
/// whether candidate values agree.
#[must_use]
pub fn eq_2dp(a: Decimal, b: Decimal) -> bool {
    a.round_dp(2) == b.round_dp(2)
}

/// Percentage difference of `other` from `reference`:
/// `|reference - other| / |other| * 100`.
///
/// Returns `None` when `other` is zero (the ratio is undefined).
#[must_use]
pub fn difference_percent(reference: Decimal, other: Decimal) -> Option<f64> {
    if other.is_zero() {
        return None;
    }
    ((reference - other).abs() / other.abs() * Decimal::ONE_HUNDRED).to_f64()
}

/// Normalizes a percent value to fractional form.
///
/// Accepts either fractional (0.05) or whole (5) input; values above 1
/// are treated as whole-number percents and divided by 100.
#[must_use]
pub fn normalize_percent(value: Decimal) -> Decimal {
    if value > Decimal::ONE {
        value / Decimal::ONE_HUNDRED
    } else {
        value
    }
}

/// Truncates a parsed decimal to an integer, for integer-typed fields.
#[must_use]
pub fn to_integer(value: Decimal) -> Option<i64> {
    value.trunc().to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_decimal_currency() {
        assert_eq!(parse_decimal("$1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_decimal("1,500"), Some(dec("1500")));
        assert_eq!(parse_decimal("  -42 "), Some(dec("-42")));
    }

    #[test]
    fn test_parse_decimal_percent() {
        assert_eq!(parse_decimal("5.5%"), Some(dec("5.5")));
        assert_eq!(parse_decimal("0.055"), Some(dec("0.055")));
    }

    #[test]
    fn test_parse_decimal_rejects_non_numeric() {
        assert!(parse_decimal("").is_none());
        assert!(parse_decimal("n/a").is_none());
        assert!(parse_decimal("$").is_none());
        assert!(parse_decimal("12 units").is_none());
    }

    #[test]
    fn test_eq_2dp() {
        assert!(eq_2dp(dec("1500"), dec("1500.004")));
        assert!(eq_2dp(dec("1500.00"), dec("1500")));
        assert!(!eq_2dp(dec("1500"), dec("1500.01")));
    }

    #[test]
    fn test_difference_percent() {
        let pct = difference_percent(dec("1500"), dec("1450")).unwrap();
        assert!((pct - 3.4482758).abs() < 0.001);
        assert!(difference_percent(dec("1500"), Decimal::ZERO).is_none());
    }

    #[test]
    fn test_normalize_percent() {
        assert_eq!(normalize_percent(dec("5")), dec("0.05"));
        assert_eq!(normalize_percent(dec("0.05")), dec("0.05"));
        assert_eq!(normalize_percent(dec("1")), dec("1"));
        assert_eq!(normalize_percent(dec("100")), dec("1"));
    }

    #[test]
    fn test_to_integer() {
        assert_eq!(to_integer(dec("1234.56")), Some(1234));
        assert_eq!(to_integer(dec("-3.9")), Some(-3));
    }
}
