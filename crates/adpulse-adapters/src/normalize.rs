//! Shared normalization helpers applied by every fetcher.
//!
//! Upstream analytics payloads are sparse and loosely typed — numbers
//! arrive as strings, fields go missing between API versions — so numeric
//! coercion favors availability: anything unusable becomes zero rather
//! than failing the row.

use serde_json::Value as JsonValue;

/// A float from a JSON number or numeric string; anything else is `0.0`.
pub fn coerce_f64(value: Option<&JsonValue>) -> f64 {
    match value {
        Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(JsonValue::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// An integer from a JSON number or numeric string; fractional values
/// truncate, anything else is `0`.
pub fn coerce_i64(value: Option<&JsonValue>) -> i64 {
    match value {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().map(|f| f as i64).unwrap_or(0)),
        Some(JsonValue::String(s)) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// A string from a JSON string or number (platforms disagree on id types).
pub fn json_string(value: Option<&JsonValue>) -> Option<String> {
    match value {
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// The value of the first action entry tagged with `action_type`.
pub fn action_value(actions: &[JsonValue], action_type: &str) -> i64 {
    for action in actions {
        if action.get("action_type").and_then(JsonValue::as_str) == Some(action_type) {
            return coerce_i64(action.get("value"));
        }
    }
    0
}

/// Sum one canonical counter across all of its raw action-type variants.
/// Upstream APIs rename action types mid-range; summing every matching
/// variant avoids undercounting when old and new names coexist.
pub fn sum_actions(actions: &[JsonValue], action_types: &[&str]) -> i64 {
    action_types
        .iter()
        .map(|action_type| action_value(actions, action_type))
        .sum()
}
