//! Locale-tolerant extraction of decimal values from the portal's payload.
//!
//! The portal reports the same physical quantity as a JSON number, a plain
//! numeric string, or a locale-formatted string with a unit suffix
//! ("1,766.08 W", "1766,08"). Everything funnels through [`coerce_decimal`]
//! so the ingestion pipeline never has to care which form arrived.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// First numeric substring, with optional sign and mixed `.`/`,` separators.
static FIRST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d{1,3}(?:[\d.,]*\d)?").expect("numeric pattern is valid"));

/// Coerce a JSON value into an exact decimal.
///
/// Numbers pass through unchanged. Strings are scanned for the first numeric
/// substring, then separator-normalized: if both `.` and `,` appear, `,` is a
/// thousands separator and is stripped; if only `,` appears it is the decimal
/// point. Missing, empty, or non-numeric values yield `None` rather than an
/// error.
pub fn coerce_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => coerce_str(s),
        _ => None,
    }
}

fn coerce_str(text: &str) -> Option<Decimal> {
    if text.trim().is_empty() {
        return None;
    }
    let m = FIRST_NUMBER.find(text)?;
    let raw = m.as_str();

    let has_dot = raw.contains('.');
    let has_comma = raw.contains(',');
    let normalized = if has_dot && has_comma {
        raw.replace(',', "")
    } else if has_comma {
        raw.replace(',', ".")
    } else {
        raw.to_string()
    };

    Decimal::from_str(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_thousands_and_decimal_mixed() {
        assert_eq!(coerce_decimal(&json!("1,766.08")), Some(dec("1766.08")));
    }

    #[test]
    fn test_comma_as_decimal_point() {
        assert_eq!(coerce_decimal(&json!("1766,08")), Some(dec("1766.08")));
    }

    #[test]
    fn test_plain_integer_string() {
        assert_eq!(coerce_decimal(&json!("1234")), Some(dec("1234")));
    }

    #[test]
    fn test_json_number_passes_through() {
        assert_eq!(coerce_decimal(&json!(42.5)), Some(dec("42.5")));
        assert_eq!(coerce_decimal(&json!(-7)), Some(dec("-7")));
    }

    #[test]
    fn test_unit_suffix_ignored() {
        assert_eq!(coerce_decimal(&json!("1,766.08 W")), Some(dec("1766.08")));
        assert_eq!(coerce_decimal(&json!("55.2(kW)")), Some(dec("55.2")));
    }

    #[test]
    fn test_negative_value() {
        assert_eq!(coerce_decimal(&json!("-120.5")), Some(dec("-120.5")));
    }

    #[test]
    fn test_placeholder_yields_none() {
        assert_eq!(coerce_decimal(&json!("--")), None);
    }

    #[test]
    fn test_empty_and_blank_yield_none() {
        assert_eq!(coerce_decimal(&json!("")), None);
        assert_eq!(coerce_decimal(&json!("   ")), None);
    }

    #[test]
    fn test_non_numeric_types_yield_none() {
        assert_eq!(coerce_decimal(&json!(null)), None);
        assert_eq!(coerce_decimal(&json!(true)), None);
        assert_eq!(coerce_decimal(&json!({"v": 1})), None);
    }
}
