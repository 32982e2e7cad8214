//! Model metadata and the surfaces generated from it.
//!
//! A [`ModelMeta`] is one node of the immutable registry snapshot. Besides
//! plain lookups it hands out the typed surfaces builders consume:
//!
//! - [`NumericField`] / [`ComparableField`] tokens for aggregates. They can
//!   only be obtained here, after the field type has been checked, so an
//!   `avg` over a text column cannot be written down.
//! - [`InputField`] lists for create and update inputs.

use crate::field::FieldMeta;
use crate::relationship::Association;
use std::collections::BTreeMap;

/// Where a model's rows come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A table or view name
    Table(String),
    /// Inline SQL, emitted as a common table expression named after the model
    Cte(String),
}

/// Metadata about one model.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    pub(crate) name: String,
    pub(crate) source: ModelSource,
    pub(crate) pk: FieldMeta,
    pub(crate) read_only: bool,
    pub(crate) include: Vec<String>,
    pub(crate) fields: BTreeMap<String, FieldMeta>,
    pub(crate) associations: BTreeMap<String, Association>,
}

impl ModelMeta {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// The primary key field.
    pub fn pk(&self) -> &FieldMeta {
        &self.pk
    }

    /// The primary key column.
    pub fn primary_key(&self) -> &str {
        &self.pk.column
    }

    /// Read-only models expose no mutation builders.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Fields that are always selected, whatever the caller requests.
    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }

    /// All fields, ordered by name.
    pub fn fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.values()
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    pub fn associations(&self) -> impl Iterator<Item = &Association> {
        self.associations.values()
    }

    /// A field usable with `avg`/`sum`.
    pub fn numeric_field(&self, name: &str) -> Option<NumericField<'_>> {
        self.field(name)
            .filter(|f| f.ty.is_numeric())
            .map(|field| NumericField {
                model: &self.name,
                field,
            })
    }

    /// A field usable with `min`/`max`.
    pub fn comparable_field(&self, name: &str) -> Option<ComparableField<'_>> {
        self.field(name)
            .filter(|f| f.ty.is_comparable())
            .map(|field| ComparableField {
                model: &self.name,
                field,
            })
    }

    /// The input surface for an action.
    ///
    /// Create inputs cover every field; a field is required when it is
    /// neither nullable nor defaulted. Update inputs exclude the primary key
    /// and make every field optional.
    pub fn input_fields(&self, action: InputAction) -> Vec<InputField<'_>> {
        self.fields
            .values()
            .filter(|f| action == InputAction::Create || f.name != self.pk.name)
            .map(|field| InputField {
                field,
                required: action == InputAction::Create && field.is_required_on_create(),
            })
            .collect()
    }
}

/// A numeric field of a specific model, accepted by `avg` and `sum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericField<'r> {
    model: &'r str,
    field: &'r FieldMeta,
}

impl<'r> NumericField<'r> {
    pub fn model(&self) -> &'r str {
        self.model
    }

    pub fn field(&self) -> &'r FieldMeta {
        self.field
    }
}

/// A comparable field of a specific model, accepted by `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparableField<'r> {
    model: &'r str,
    field: &'r FieldMeta,
}

impl<'r> ComparableField<'r> {
    pub fn model(&self) -> &'r str {
        self.model
    }

    pub fn field(&self) -> &'r FieldMeta {
        self.field
    }
}

impl<'r> From<NumericField<'r>> for ComparableField<'r> {
    fn from(f: NumericField<'r>) -> Self {
        Self {
            model: f.model,
            field: f.field,
        }
    }
}

/// Which mutation an input surface is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Create,
    Update,
}

/// One entry of an input surface.
#[derive(Debug, Clone, Copy)]
pub struct InputField<'r> {
    pub field: &'r FieldMeta,
    pub required: bool,
}
