//! Lenient conversions from loosely-typed JSON produced by language models.
//!
//! Models routinely answer with `["x"]` where `"x"` was asked for, or with
//! `{"value": 3}` where `3` was. These helpers pick the useful scalar out.

use serde_json::Value;

/// String from a string, the first element of an array, or the first
/// non-empty value of an object. Numbers and booleans are stringified.
pub fn string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.first().map(string).unwrap_or_default(),
        Value::Object(map) => map
            .values()
            .map(string)
            .find(|s| !s.is_empty())
            .unwrap_or_default(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
    }
}

/// Non-empty strings from an array, a single string, or object values.
pub fn string_list(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .map(string)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Vec::new()
            } else {
                vec![s.to_string()]
            }
        }
        Value::Object(map) => map
            .values()
            .map(string)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Floating point number from a number, numeric string, array or object.
pub fn float(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) => items.first().and_then(float),
        Value::Object(map) => map.values().find_map(float),
        _ => None,
    }
}

/// Integer view of [`float`], truncating toward zero.
pub fn int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        Value::Array(items) => items.first().and_then(int),
        Value::Object(map) => map.values().find_map(int),
        _ => None,
    }
}

pub fn int_list(v: &Value) -> Vec<i64> {
    match v {
        Value::Array(items) => items.iter().filter_map(int).collect(),
        other => int(other).into_iter().collect(),
    }
}

pub fn boolean(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}
