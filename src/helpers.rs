//! Shared helpers for turning loosely-typed JSON request fields into model inputs.
//!
//! Clients send the same field as `3`, `3.0`, `"3"` or `true` depending on
//! which form produced the payload. Numbers are coerced leniently; only the
//! JSON shape (objects, arrays, null) is rejected.

use serde_json::Value;

/// Coerce a JSON value into a finite `f64`.
///
/// Accepts numbers, booleans (true → 1, false → 0) and numeric strings.
/// Returns `None` for anything else, including NaN/±Inf strings.
pub(crate) fn value_as_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// String-cast a JSON value for categorical encoding.
///
/// Strings are trimmed; numbers keep their JSON textual form (`3` → "3");
/// booleans become "true"/"false". Objects, arrays and null yield `None`.
///
/// The cast is textual, not numeric: `3.0` becomes "3.0" and does not match
/// an encoder category fit as `3`. Under the `ignore` policy such a value
/// zero-fills its block; under `error` the request is rejected.
pub(crate) fn value_as_category(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert a model output to `f64`, rejecting non-finite values.
pub(crate) fn finite_f64(v: f32) -> Option<f64> {
    v.is_finite().then_some(v as f64)
}
