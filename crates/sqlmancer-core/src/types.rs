//! Semantic field types.
//!
//! These are the types the operator table, the aggregate surface and the
//! result decoder dispatch on. They describe what a column means to the
//! client, not how the database stores it.

use std::sync::Arc;

/// The scalar part of a field's semantic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarType {
    Id,
    String,
    Number,
    Boolean,
    Date,
    Json,
    Enum(Arc<EnumMeta>),
}

/// A field's full semantic type: a scalar, or a list of that scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    pub scalar: ScalarType,
    pub list: bool,
}

impl FieldType {
    pub const fn scalar(scalar: ScalarType) -> Self {
        Self {
            scalar,
            list: false,
        }
    }

    pub const fn list_of(scalar: ScalarType) -> Self {
        Self { scalar, list: true }
    }

    /// Fields that `avg` and `sum` accept.
    pub fn is_numeric(&self) -> bool {
        !self.list && matches!(self.scalar, ScalarType::Number)
    }

    /// Fields that `min` and `max` accept.
    pub fn is_comparable(&self) -> bool {
        !self.list
            && matches!(
                self.scalar,
                ScalarType::Number | ScalarType::String | ScalarType::Id | ScalarType::Date
            )
    }

    /// Name used in diagnostics.
    pub fn type_name(&self) -> String {
        let scalar = match &self.scalar {
            ScalarType::Id => "ID",
            ScalarType::String => "String",
            ScalarType::Number => "Number",
            ScalarType::Boolean => "Boolean",
            ScalarType::Date => "Date",
            ScalarType::Json => "JSON",
            ScalarType::Enum(meta) => meta.name.as_str(),
        };
        if self.list {
            format!("[{scalar}]")
        } else {
            scalar.to_string()
        }
    }

    /// The enum metadata, for enum-typed fields.
    pub fn enum_meta(&self) -> Option<&EnumMeta> {
        match &self.scalar {
            ScalarType::Enum(meta) => Some(meta),
            _ => None,
        }
    }
}

/// An enum type: public values as clients see them, mapped to stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMeta {
    pub name: String,
    /// `(public, stored)` pairs in declaration order
    pub values: Vec<(String, String)>,
}

impl EnumMeta {
    /// Stored value for a public value.
    pub fn to_stored(&self, public: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(p, _)| p == public)
            .map(|(_, s)| s.as_str())
    }

    /// Public value for a stored value.
    pub fn to_public(&self, stored: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, s)| s == stored)
            .map(|(p, _)| p.as_str())
    }
}
