//! Registry configuration documents.
//!
//! The registry is produced by whatever front-end reads the schema
//! annotations. It arrives here as a serde document and is folded into an
//! immutable [`Registry`](crate::Registry).
//!
//! ```json
//! {
//!   "dialect": "SQLITE",
//!   "transformFieldNames": "SNAKE_CASE",
//!   "enums": { "FilmRating": { "values": { "G": "G", "PG13": "PG-13" } } },
//!   "models": {
//!     "Film": {
//!       "table": "film",
//!       "pk": "film_id",
//!       "fields": {
//!         "id": { "type": "ID", "column": "film_id", "hasDefault": true },
//!         "title": { "type": "String" },
//!         "rating": { "type": { "enum": "FilmRating" } }
//!       },
//!       "associations": {
//!         "language": { "model": "Language", "on": [{ "from": "language_id", "to": "language_id" }] }
//!       }
//!     }
//!   }
//! }
//! ```

use crate::dialect::Dialect;
use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level registry document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    pub dialect: Dialect,
    /// How default column names are derived from field names
    #[serde(default)]
    pub transform_field_names: Option<FieldNameTransform>,
    #[serde(default)]
    pub enums: BTreeMap<String, EnumConfig>,
    pub models: BTreeMap<String, ModelConfig>,
}

/// Casing applied to a field name to obtain its default column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldNameTransform {
    CamelCase,
    PascalCase,
    SnakeCase,
}

impl FieldNameTransform {
    pub fn apply(self, field_name: &str) -> String {
        match self {
            FieldNameTransform::CamelCase => field_name.to_lower_camel_case(),
            FieldNameTransform::PascalCase => field_name.to_upper_camel_case(),
            FieldNameTransform::SnakeCase => field_name.to_snake_case(),
        }
    }
}

/// An enum: public value → stored value.
#[derive(Debug, Clone, Deserialize)]
pub struct EnumConfig {
    pub values: BTreeMap<String, String>,
}

/// One model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub cte: Option<String>,
    /// Primary key column
    pub pk: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub private: bool,
    /// Fields always selected
    #[serde(default)]
    pub include: Vec<String>,
    pub fields: BTreeMap<String, FieldConfig>,
    #[serde(default)]
    pub associations: BTreeMap<String, AssociationConfig>,
}

/// One field.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    #[serde(rename = "type")]
    pub ty: FieldTypeConfig,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub nullable: bool,
    /// Explicit column name; defaults to the transformed field name
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub has_default: bool,
    #[serde(default)]
    pub private: bool,
    /// Not backed by a column at all
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Semantic type of a field as written in the document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum FieldTypeConfig {
    #[serde(rename = "ID")]
    Id,
    String,
    Number,
    Boolean,
    Date,
    #[serde(rename = "JSON")]
    Json,
    /// Reference to an entry of `RegistryConfig::enums`
    #[serde(rename = "enum")]
    Enum(String),
}

/// One association.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationConfig {
    pub model: String,
    pub on: Vec<JoinPairConfig>,
    #[serde(default)]
    pub through: Option<String>,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub paginate: bool,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinPairConfig {
    pub from: String,
    pub to: String,
}
