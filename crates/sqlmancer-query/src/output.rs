//! Result decoding: raw column values back into client-facing JSON.

use serde_json::Value as JsonValue;
use sqlmancer_core::{EnumMeta, FieldMeta, ScalarType, Value};

/// One decoded result row, keyed by logical field name.
pub type Record = serde_json::Map<String, JsonValue>;

/// Decode a column value according to its field's semantic type.
///
/// - booleans stored as integers become `true`/`false`
/// - JSON and list columns stored as text are parsed
/// - enum values are mapped back to their public names
pub fn decode_field(field: &FieldMeta, value: &Value) -> JsonValue {
    if value.is_null() {
        return JsonValue::Null;
    }
    if field.ty.list {
        let items = parse_json_text(value);
        return match (&items, field.ty.enum_meta()) {
            (JsonValue::Array(values), Some(meta)) => {
                JsonValue::Array(values.iter().map(|v| enum_to_public(meta, v)).collect())
            }
            _ => items,
        };
    }
    match &field.ty.scalar {
        ScalarType::Boolean => value.as_bool().map_or_else(|| value.to_json(), JsonValue::Bool),
        ScalarType::Json => parse_json_text(value),
        ScalarType::Enum(meta) => enum_to_public(meta, &value.to_json()),
        ScalarType::Number => decode_number(value),
        ScalarType::Id | ScalarType::String | ScalarType::Date => value.to_json(),
    }
}

/// Decode a numeric value; numeric text (e.g. DECIMAL) becomes a number.
pub fn decode_number(value: &Value) -> JsonValue {
    match value {
        Value::Text(s) | Value::Decimal(s) => s
            .parse::<i64>()
            .map(JsonValue::from)
            .ok()
            .or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(JsonValue::Number)
            })
            .unwrap_or_else(|| JsonValue::String(s.clone())),
        other => other.to_json(),
    }
}

fn parse_json_text(value: &Value) -> JsonValue {
    match value {
        Value::Text(s) => serde_json::from_str(s).unwrap_or_else(|_| JsonValue::String(s.clone())),
        Value::Bytes(b) => serde_json::from_slice(b).unwrap_or(JsonValue::Null),
        other => other.to_json(),
    }
}

fn enum_to_public(meta: &EnumMeta, stored: &JsonValue) -> JsonValue {
    match stored.as_str().and_then(|s| meta.to_public(s)) {
        Some(public) => JsonValue::String(public.to_string()),
        None => stored.clone(),
    }
}
