//! Dynamic SQL values.

use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// This enum is used for parameter binding and result fetching. Builders
/// receive client data as `serde_json::Value` and lower it into `Value`
/// once the target field's semantic type is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Boolean value
    Bool(bool),

    /// 32-bit signed integer
    Int(i32),

    /// 64-bit signed integer
    BigInt(i64),

    /// 64-bit floating point
    Double(f64),

    /// Arbitrary precision decimal (stored as string)
    Decimal(String),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// JSON document
    Json(serde_json::Value),

    /// Array of values (native array columns)
    Array(Vec<Value>),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            Value::BigInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Lower an untyped JSON scalar into a bind value.
    ///
    /// Objects are kept as JSON documents and arrays become `Array`.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::BigInt(i)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Json(json.clone()),
        }
    }

    /// Convert to an untyped JSON value.
    ///
    /// Bytes become an array of numbers; non-finite doubles become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::BigInt(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Decimal(s) => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map_or_else(
                    || serde_json::Value::String(s.clone()),
                    serde_json::Value::Number,
                ),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::Json(j) => j.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Value::from_json(&json!(null)), Value::Null);
        assert_eq!(Value::from_json(&json!(true)), Value::Bool(true));
        assert_eq!(Value::from_json(&json!(42)), Value::BigInt(42));
        assert_eq!(Value::from_json(&json!(0.99)), Value::Double(0.99));
        assert_eq!(
            Value::from_json(&json!("ACADEMY DINOSAUR")),
            Value::Text("ACADEMY DINOSAUR".to_string())
        );
        assert_eq!(
            Value::from_json(&json!([1, "a"])),
            Value::Array(vec![Value::BigInt(1), Value::Text("a".to_string())])
        );
        assert_eq!(
            Value::from_json(&json!({"a": 1})),
            Value::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::Int(7).to_json(), json!(7));
        assert_eq!(Value::Double(2.5).to_json(), json!(2.5));
        assert_eq!(Value::Double(f64::NAN).to_json(), json!(null));
        assert_eq!(Value::Decimal("4.99".into()).to_json(), json!(4.99));
        assert_eq!(Value::Decimal("n/a".into()).to_json(), json!("n/a"));
        assert_eq!(
            Value::Array(vec![Value::Bool(false), Value::Null]).to_json(),
            json!([false, null])
        );
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::Int(3).as_i64(), Some(3));
        assert_eq!(Value::BigInt(1).as_bool(), Some(true));
        assert_eq!(Value::Text("1".into()).as_bool(), None);
        assert_eq!(Value::Text("x".into()).as_i64(), None);
    }
}
