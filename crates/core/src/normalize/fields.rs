//! Field lookup helpers over raw JSON.
//!
//! Raw records arrive in GraphQL (`camelCase`, connections) and REST
//! (`snake_case`, plain arrays) shapes. Every helper here is total: absent or
//! mistyped data yields `None`, never a panic.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

/// Follow a key path through nested objects. `null` counts as absent.
pub fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let found = path.iter().try_fold(raw, |value, key| value.get(key))?;
    (!found.is_null()).then_some(found)
}

/// First present value among several key paths.
pub fn first_of<'a>(raw: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(raw, path))
}

/// Non-blank string, trimmed. Numbers and booleans are rendered as text.
pub fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// First non-blank string among several key paths.
pub fn text_of(raw: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| lookup(raw, path).and_then(text))
}

/// Decimal from a JSON string or number.
///
/// Money amounts may arrive as `"12.50"`, `12.5`, or wrapped in a
/// `{ "amount": ... }` object.
pub fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::Object(_) => value.get("amount").and_then(decimal),
        _ => None,
    }
}

/// Integer quantity from a JSON number or numeric string.
pub fn integer(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// RFC 3339 timestamp.
pub fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Items of a list-like value.
///
/// Accepts a plain array, a GraphQL `{ "nodes": [...] }` connection, or a
/// GraphQL `{ "edges": [{ "node": ... }] }` connection.
pub fn list_items(value: &Value) -> Option<Vec<&Value>> {
    if let Some(items) = value.as_array() {
        return Some(items.iter().collect());
    }
    if let Some(nodes) = value.get("nodes").and_then(Value::as_array) {
        return Some(nodes.iter().collect());
    }
    value
        .get("edges")
        .and_then(Value::as_array)
        .map(|edges| edges.iter().filter_map(|edge| edge.get("node")).collect())
}
