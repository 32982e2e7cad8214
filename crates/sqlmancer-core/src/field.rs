//! Field metadata.

use crate::types::FieldType;

/// Metadata about one client-visible field of a model.
///
/// Private and ignored fields never reach this type: the registry drops them
/// while it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    /// Logical (client-facing) name
    pub name: String,
    /// Database column name
    pub column: String,
    /// Semantic type
    pub ty: FieldType,
    /// Whether the column accepts NULL
    pub nullable: bool,
    /// Whether the database supplies a value on insert
    pub has_default: bool,
    /// Fields this one is computed from; carried for callers, unused here
    pub depends_on: Vec<String>,
}

impl FieldMeta {
    /// Whether a create input must provide this field.
    pub fn is_required_on_create(&self) -> bool {
        !self.nullable && !self.has_default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;

    fn field(nullable: bool, has_default: bool) -> FieldMeta {
        FieldMeta {
            name: "email".to_string(),
            column: "email".to_string(),
            ty: FieldType::scalar(ScalarType::String),
            nullable,
            has_default,
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn required_on_create() {
        assert!(field(false, false).is_required_on_create());
        assert!(!field(true, false).is_required_on_create());
        assert!(!field(false, true).is_required_on_create());
    }
}
