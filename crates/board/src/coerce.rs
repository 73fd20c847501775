//! Lenient readers for loosely typed stored JSON.
//!
//! Board state written by older clients carries booleans as numbers or strings
//! and coordinates as strings. Everything here maps those forms onto typed
//! values without failing; callers pick the fallback.

use serde_json::Value;

/// String forms accepted as `false`, compared after trimming and lowercasing.
pub(crate) const FALSE_FORMS: [&str; 4] = ["false", "0", "off", "no"];
/// String forms accepted as `true`, compared after trimming and lowercasing.
pub(crate) const TRUE_FORMS: [&str; 4] = ["true", "1", "on", "yes"];

/// Reads a flag.
///
/// | stored value            | result                      |
/// |-------------------------|-----------------------------|
/// | missing / `null`        | `default`                   |
/// | bool                    | itself                      |
/// | number                  | non-zero and not NaN        |
/// | string in `FALSE_FORMS` | `false`                     |
/// | string in `TRUE_FORMS`  | `true`                      |
/// | any other string        | non-empty                   |
/// | array / object          | `true`                      |
pub(crate) fn parse_flag(value: Option<&Value>, default: bool) -> bool {
    match value {
        None | Some(Value::Null) => default,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number
            .as_f64()
            .is_some_and(|value| value != 0.0 && !value.is_nan()),
        Some(Value::String(raw)) => parse_flag_str(raw),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

fn parse_flag_str(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    if FALSE_FORMS.contains(&normalized.as_str()) {
        return false;
    }
    if TRUE_FORMS.contains(&normalized.as_str()) {
        return true;
    }
    !raw.is_empty()
}

/// Returns the trimmed string when it is non-empty.
pub(crate) fn trimmed_string(value: Option<&Value>) -> Option<String> {
    let trimmed = value?.as_str()?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads a finite number from a JSON number or a numeric string.
pub(crate) fn finite_number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64()?,
        Value::String(raw) => raw.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Rounds to 4 decimal places.
pub(crate) fn round4(value: f64) -> f64 {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    // Avoid persisting `-0.0`.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flag_table_string_forms() {
        for form in ["false", " 0", "OFF", "No "] {
            assert!(!parse_flag(Some(&json!(form)), true), "{form}");
        }
        for form in ["true", "1", "On", " YES"] {
            assert!(parse_flag(Some(&json!(form)), false), "{form}");
        }
    }

    #[test]
    fn flag_falls_back_to_truthiness() {
        assert!(parse_flag(Some(&json!("maybe")), false));
        assert!(!parse_flag(Some(&json!("")), true));
        assert!(!parse_flag(Some(&json!(0)), true));
        assert!(parse_flag(Some(&json!(2.5)), false));
        assert!(parse_flag(Some(&json!({})), false));
        assert!(parse_flag(Some(&json!([])), false));
    }

    #[test]
    fn flag_missing_or_null_uses_default() {
        assert!(parse_flag(None, true));
        assert!(!parse_flag(Some(&Value::Null), false));
    }

    #[test]
    fn trimmed_string_drops_blank() {
        assert_eq!(trimmed_string(Some(&json!("  a.png "))), Some("a.png".into()));
        assert_eq!(trimmed_string(Some(&json!("   "))), None);
        assert_eq!(trimmed_string(Some(&json!(3))), None);
    }

    #[test]
    fn finite_number_accepts_numeric_strings() {
        assert_eq!(finite_number(Some(&json!("2.5"))), Some(2.5));
        assert_eq!(finite_number(Some(&json!(4))), Some(4.0));
        assert_eq!(finite_number(Some(&json!("nan"))), None);
        assert_eq!(finite_number(Some(&json!(true))), None);
    }

    #[test]
    fn round4_keeps_four_places() {
        assert_eq!(round4(1.234_56), 1.2346);
        assert_eq!(round4(-0.000_01), 0.0);
    }
}
