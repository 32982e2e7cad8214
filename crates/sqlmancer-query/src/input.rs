//! Create and update input validation.
//!
//! Inputs are JSON objects keyed by field name. They are checked against the
//! model's input surface for the action and lowered into bind values in one
//! pass; every problem found is collected into a single `ValidationError`.

use serde_json::Value as JsonValue;
use sqlmancer_core::{
    CompileError, Dialect, Error, FieldMeta, InputAction, ModelMeta, Result, ScalarType,
    ValidationError, Value,
};

/// One validated input entry.
pub(crate) type Assignment<'r> = (&'r FieldMeta, Value);

enum Problem {
    Type(&'static str),
    EnumValue(String),
}

/// Validate `input` for `action` and lower it into column assignments, in
/// input key order.
pub(crate) fn validate<'r>(
    model: &'r ModelMeta,
    dialect: Dialect,
    action: InputAction,
    input: &JsonValue,
) -> Result<Vec<Assignment<'r>>> {
    let Some(map) = input.as_object() else {
        return Err(Error::Compile(CompileError::invalid_input(format!(
            "input for {} must be an object, got {input}",
            model.name()
        ))));
    };

    let surface = model.input_fields(action);
    let mut errors = ValidationError::new();
    let mut assignments = Vec::with_capacity(map.len());

    for (name, value) in map {
        let Some(entry) = surface.iter().find(|entry| entry.field.name == *name) else {
            errors.add_unknown(name);
            continue;
        };
        match lower(entry.field, dialect, value) {
            Ok(value) => assignments.push((entry.field, value)),
            Err(Problem::Type(expected)) => errors.add_type(name, expected),
            Err(Problem::EnumValue(actual)) => {
                let enum_name = entry.field.ty.enum_meta().map_or("", |meta| meta.name.as_str());
                errors.add_enum_value(name, enum_name, &actual);
            }
        }
    }
    for entry in surface.iter().filter(|entry| entry.required) {
        if !map.contains_key(&entry.field.name) {
            errors.add_required(&entry.field.name);
        }
    }

    errors.into_result().map_err(Error::Validation)?;
    Ok(assignments)
}

fn lower(field: &FieldMeta, dialect: Dialect, value: &JsonValue) -> std::result::Result<Value, Problem> {
    if value.is_null() {
        return if field.nullable {
            Ok(Value::Null)
        } else {
            Err(Problem::Type("non-null"))
        };
    }
    if field.ty.list {
        let JsonValue::Array(items) = value else {
            return Err(Problem::Type("a list"));
        };
        let items = items
            .iter()
            .map(|item| lower_scalar(field, item))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        return Ok(match dialect {
            Dialect::Postgres => Value::Array(items),
            _ => Value::Json(JsonValue::Array(items.iter().map(Value::to_json).collect())),
        });
    }
    lower_scalar(field, value)
}

fn lower_scalar(field: &FieldMeta, value: &JsonValue) -> std::result::Result<Value, Problem> {
    match (&field.ty.scalar, value) {
        (ScalarType::Boolean, JsonValue::Bool(b)) => Ok(Value::Bool(*b)),
        (ScalarType::Boolean, _) => Err(Problem::Type("a boolean")),
        (ScalarType::Enum(meta), JsonValue::String(public)) => meta
            .to_stored(public)
            .map(|stored| Value::Text(stored.to_string()))
            .ok_or_else(|| Problem::EnumValue(public.clone())),
        (ScalarType::Enum(_), other) => Err(Problem::EnumValue(other.to_string())),
        (ScalarType::Json, other) => Ok(Value::Json(other.clone())),
        (_, other) => Ok(Value::from_json(other)),
    }
}
