//! Per-field coercion from loosely-typed JSON values.
//!
//! Each helper maps a JSON value to the declared field type or to `None`.
//! A type mismatch never fails the record; it only nulls the field.

use serde_json::{Map, Value};

/// Read a string field. Numbers and booleans are rendered as text, so an
/// epoch written as a JSON integer still yields its digit string. Floats
/// keep their scientific notation (see [`float_text`]).
pub fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_f64() => n.as_f64().map(float_text),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Render a float as the JVM prints a double: plain notation with at least
/// one fractional digit for magnitudes in `[1e-3, 1e7)`, `1.542242481796E12`
/// style otherwise.
fn float_text(v: f64) -> String {
    let magnitude = v.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let plain = v.to_string();
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        let sci = format!("{v:E}");
        match sci.split_once('E') {
            Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
            _ => sci,
        }
    }
}

/// Read a double field. Any JSON number is accepted.
pub fn double_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Read a 32-bit integer field. Fractional numbers and values outside the
/// `i32` range are nulled.
pub fn int_field(obj: &Map<String, Value>, key: &str) -> Option<i32> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn string_field_renders_scalars() {
        let o = obj(json!({
            "s": "Artist X",
            "n": 1542242481796_i64,
            "b": true,
            "z": null,
            "a": [1, 2],
        }));
        assert_eq!(string_field(&o, "s").as_deref(), Some("Artist X"));
        assert_eq!(string_field(&o, "n").as_deref(), Some("1542242481796"));
        assert_eq!(string_field(&o, "b").as_deref(), Some("true"));
        assert_eq!(string_field(&o, "z"), None);
        assert_eq!(string_field(&o, "a"), None);
        assert_eq!(string_field(&o, "missing"), None);
    }

    #[test]
    fn string_field_keeps_float_notation() {
        let o = obj(json!({
            "epoch": 1.542242481796E12,
            "round": 1.0E12,
            "small": 210.5,
            "whole": 7.0,
            "tiny": 0.0001,
        }));
        assert_eq!(string_field(&o, "epoch").as_deref(), Some("1.542242481796E12"));
        assert_eq!(string_field(&o, "round").as_deref(), Some("1.0E12"));
        assert_eq!(string_field(&o, "small").as_deref(), Some("210.5"));
        assert_eq!(string_field(&o, "whole").as_deref(), Some("7.0"));
        assert_eq!(string_field(&o, "tiny").as_deref(), Some("1.0E-4"));
    }

    #[test]
    fn double_field_accepts_integers_and_rejects_strings() {
        let o = obj(json!({"d": 210.5, "i": 7, "s": "210.5"}));
        assert_eq!(double_field(&o, "d"), Some(210.5));
        assert_eq!(double_field(&o, "i"), Some(7.0));
        assert_eq!(double_field(&o, "s"), None);
    }

    #[test]
    fn int_field_nulls_fractional_and_out_of_range() {
        let o = obj(json!({
            "ok": 3,
            "neg": -12,
            "frac": 3.5,
            "big": 4_000_000_000_i64,
            "text": "3",
        }));
        assert_eq!(int_field(&o, "ok"), Some(3));
        assert_eq!(int_field(&o, "neg"), Some(-12));
        assert_eq!(int_field(&o, "frac"), None);
        assert_eq!(int_field(&o, "big"), None);
        assert_eq!(int_field(&o, "text"), None);
    }
}
