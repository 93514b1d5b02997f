//! Lenient conversion of feed JSON into trimmed strings and finite numbers.
//!
//! Feeds are produced by several ingestors and are not consistent about
//! types: numbers arrive as strings, identifiers arrive as numbers, and empty
//! strings stand in for "unknown". Every reader above this module goes through
//! these helpers instead of matching on `serde_json::Value` directly.

use serde_json::{Map, Value};

/// Look up `key`, treating JSON `null` the same as a missing key.
pub fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

/// Trimmed, non-empty string form of a scalar.
pub fn trimmed_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Finite `f64` from a number, numeric string or boolean.
pub fn finite_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// Integer from a number, decimal string, `0x` hex string or boolean.
///
/// Fractional inputs are truncated toward zero.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Some(hex) = trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
            {
                return i64::from_str_radix(hex, 16).ok();
            }
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Non-negative integer, used for node numbers.
pub fn unsigned(value: &Value) -> Option<u64> {
    integer(value).and_then(|n| u64::try_from(n).ok())
}

/// Truthiness as the ingestors write it: bools, 0/1, and common words.
pub fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    field(map, key).and_then(trimmed_string)
}

pub fn number_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    field(map, key).and_then(finite_number)
}

pub fn integer_field(map: &Map<String, Value>, key: &str) -> Option<i64> {
    field(map, key).and_then(integer)
}

pub fn unsigned_field(map: &Map<String, Value>, key: &str) -> Option<u64> {
    field(map, key).and_then(unsigned)
}

pub fn bool_field(map: &Map<String, Value>, key: &str) -> Option<bool> {
    field(map, key).and_then(boolean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_trimmed_and_empty_is_absent() {
        assert_eq!(trimmed_string(&json!("  !abcd  ")), Some("!abcd".to_string()));
        assert_eq!(trimmed_string(&json!("   ")), None);
        assert_eq!(trimmed_string(&json!(42)), Some("42".to_string()));
        assert_eq!(trimmed_string(&json!(null)), None);
        assert_eq!(trimmed_string(&json!({"a": 1})), None);
    }

    #[test]
    fn numbers_reject_non_finite_and_garbage() {
        assert_eq!(finite_number(&json!(3.5)), Some(3.5));
        assert_eq!(finite_number(&json!(" 12.25 ")), Some(12.25));
        assert_eq!(finite_number(&json!("NaN")), None);
        assert_eq!(finite_number(&json!("inf")), None);
        assert_eq!(finite_number(&json!("abc")), None);
        assert_eq!(finite_number(&json!("")), None);
        assert_eq!(finite_number(&json!([1])), None);
    }

    #[test]
    fn integers_accept_hex_and_truncate_floats() {
        assert_eq!(integer(&json!("0x10")), Some(16));
        assert_eq!(integer(&json!(" 42 ")), Some(42));
        assert_eq!(integer(&json!("7.9")), Some(7));
        assert_eq!(integer(&json!(-3.7)), Some(-3));
        assert_eq!(integer(&json!(true)), Some(1));
        assert_eq!(integer(&json!("nope")), None);
        assert_eq!(unsigned(&json!(-1)), None);
        assert_eq!(unsigned(&json!(2712847316u64)), Some(2712847316));
    }

    #[test]
    fn booleans_follow_ingestor_spelling() {
        assert_eq!(boolean(&json!("TRUE")), Some(true));
        assert_eq!(boolean(&json!(0)), Some(false));
        assert_eq!(boolean(&json!("maybe")), None);
    }

    #[test]
    fn null_fields_are_missing() {
        let map = json!({"a": null, "b": "x"});
        let map = map.as_object().unwrap();
        assert!(field(map, "a").is_none());
        assert_eq!(string_field(map, "b"), Some("x".to_string()));
    }
}
