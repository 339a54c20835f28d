use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use super::CompareOp;

pub(super) fn select(value: &JsonValue, pointer: Option<&str>) -> Option<JsonValue> {
    match pointer {
        None | Some("") => Some(value.clone()),
        Some(p) => value.pointer(p).cloned(),
    }
}

pub(super) fn env_value(name: &str) -> Option<JsonValue> {
    std::env::var(name).ok().map(JsonValue::String)
}

pub fn json_truthy(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty() && s != "false" && s != "0",
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

pub fn parse_literal(s: &str) -> JsonValue {
    let s = s.trim();

    if let Ok(v) = serde_json::from_str::<JsonValue>(s) {
        return v;
    }

    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return JsonValue::String(s[1..s.len() - 1].to_string());
    }

    JsonValue::String(s.to_string())
}

pub(super) fn compare_values(actual: &JsonValue, expected: &JsonValue, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => json_eq(actual, expected),
        CompareOp::Ne => !json_eq(actual, expected),
        CompareOp::Lt => json_cmp(actual, expected).is_some_and(|o| o.is_lt()),
        CompareOp::Gt => json_cmp(actual, expected).is_some_and(|o| o.is_gt()),
        CompareOp::Le => json_cmp(actual, expected).is_some_and(|o| o.is_le()),
        CompareOp::Ge => json_cmp(actual, expected).is_some_and(|o| o.is_ge()),
    }
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        // Env values and command stdout arrive as strings.
        (JsonValue::String(s), JsonValue::Number(_) | JsonValue::Bool(_))
        | (JsonValue::Number(_) | JsonValue::Bool(_), JsonValue::String(s)) => {
            let other = if a.is_string() { b } else { a };
            s.trim() == other.to_string()
        }
        _ => a == b,
    }
}

fn json_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

fn as_number(v: &JsonValue) -> Option<f64> {
    match v {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
