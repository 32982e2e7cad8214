//! The model registry.
//!
//! A [`Registry`] is an immutable snapshot of every model, field, association
//! and enum the builders may reference. It is folded once out of a
//! [`RegistryConfig`] and shared read-only afterwards. Private and ignored
//! members are dropped during the fold, so nothing downstream has to filter
//! them again.

use crate::config::{AssociationConfig, FieldConfig, FieldTypeConfig, ModelConfig, RegistryConfig};
use crate::dialect::Dialect;
use crate::error::{ConfigError, Error, Result};
use crate::field::FieldMeta;
use crate::model::{ModelMeta, ModelSource};
use crate::relationship::{Association, AssociationJoin, Cardinality, JoinPair};
use crate::types::{EnumMeta, FieldType, ScalarType};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable model metadata for one database.
#[derive(Debug, Clone)]
pub struct Registry {
    dialect: Dialect,
    models: BTreeMap<String, ModelMeta>,
}

impl Registry {
    /// Parse and fold a JSON registry document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RegistryConfig = serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid registry document: {e}"),
                source: Some(Box::new(e)),
            })
        })?;
        Self::from_config(&config)
    }

    /// Fold a registry document into a snapshot.
    #[tracing::instrument(level = "debug", skip(config), fields(dialect = config.dialect.as_str()))]
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let enums: BTreeMap<&str, Arc<EnumMeta>> = config
            .enums
            .iter()
            .map(|(name, e)| {
                let meta = EnumMeta {
                    name: name.clone(),
                    values: e
                        .values
                        .iter()
                        .map(|(public, stored)| (public.clone(), stored.clone()))
                        .collect(),
                };
                (name.as_str(), Arc::new(meta))
            })
            .collect();

        let models = config
            .models
            .iter()
            .filter(|(_, model)| !model.private)
            .map(|(name, model)| {
                build_model(config, &enums, name, model).map(|meta| (name.clone(), meta))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        tracing::debug!(models = models.len(), enums = enums.len(), "Registry built");

        Ok(Self {
            dialect: config.dialect,
            models,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn model(&self, name: &str) -> Option<&ModelMeta> {
        self.models.get(name)
    }

    /// Look up a model, failing with the unknown-model error.
    pub fn require_model(&self, name: &str) -> Result<&ModelMeta> {
        self.models
            .get(name)
            .ok_or_else(|| Error::Config(ConfigError::unknown_model(name)))
    }

    /// All models, ordered by name.
    pub fn models(&self) -> impl Iterator<Item = &ModelMeta> {
        self.models.values()
    }

    /// The target model of an association.
    pub fn target_of(&self, association: &Association) -> Result<&ModelMeta> {
        self.require_model(&association.model)
    }
}

fn build_model(
    config: &RegistryConfig,
    enums: &BTreeMap<&str, Arc<EnumMeta>>,
    name: &str,
    model: &ModelConfig,
) -> Result<ModelMeta> {
    let source = match (&model.table, &model.cte) {
        (Some(table), None) => ModelSource::Table(table.clone()),
        (None, Some(cte)) => ModelSource::Cte(cte.clone()),
        (Some(_), Some(_)) => {
            return Err(config_error(format!(
                "Model \"{name}\" specifies both a table and a cte"
            )));
        }
        (None, None) => {
            return Err(config_error(format!(
                "Model \"{name}\" must specify either a table or a cte"
            )));
        }
    };

    let mut all_fields = Vec::with_capacity(model.fields.len());
    for (field_name, field) in model.fields.iter().filter(|(_, f)| !f.ignore) {
        let meta = build_field(config, enums, name, field_name, field)?;
        all_fields.push((field.private, meta));
    }

    let mut pk_matches = all_fields.iter().filter(|(_, f)| f.column == model.pk);
    let pk = match (pk_matches.next(), pk_matches.next()) {
        (Some((_, pk)), None) => pk.clone(),
        (None, _) => {
            return Err(config_error(format!(
                "Model \"{name}\" has no field for primary key column \"{}\"",
                model.pk
            )));
        }
        (Some(_), Some(_)) => {
            return Err(config_error(format!(
                "Model \"{name}\" has more than one field for primary key column \"{}\"",
                model.pk
            )));
        }
    };

    let fields: BTreeMap<String, FieldMeta> = all_fields
        .into_iter()
        .filter(|(private, _)| !private)
        .map(|(_, f)| (f.name.clone(), f))
        .collect();

    if let Some(unknown) = model.include.iter().find(|i| !fields.contains_key(*i)) {
        return Err(config_error(format!(
            "Model \"{name}\" includes unknown field \"{unknown}\""
        )));
    }

    let mut associations = BTreeMap::new();
    for (assoc_name, assoc) in model.associations.iter().filter(|(_, a)| !a.private) {
        let target = config
            .models
            .get(&assoc.model)
            .ok_or_else(|| Error::Config(ConfigError::unknown_model(&assoc.model)))?;
        if target.private {
            continue;
        }
        associations.insert(assoc_name.clone(), build_association(name, assoc_name, assoc)?);
    }

    Ok(ModelMeta {
        name: name.to_string(),
        read_only: model.read_only || matches!(source, ModelSource::Cte(_)),
        source,
        pk,
        include: model.include.clone(),
        fields,
        associations,
    })
}

fn build_field(
    config: &RegistryConfig,
    enums: &BTreeMap<&str, Arc<EnumMeta>>,
    model_name: &str,
    field_name: &str,
    field: &FieldConfig,
) -> Result<FieldMeta> {
    let scalar = match &field.ty {
        FieldTypeConfig::Id => ScalarType::Id,
        FieldTypeConfig::String => ScalarType::String,
        FieldTypeConfig::Number => ScalarType::Number,
        FieldTypeConfig::Boolean => ScalarType::Boolean,
        FieldTypeConfig::Date => ScalarType::Date,
        FieldTypeConfig::Json => ScalarType::Json,
        FieldTypeConfig::Enum(enum_name) => {
            let meta = enums.get(enum_name.as_str()).ok_or_else(|| {
                config_error(format!(
                    "Field \"{model_name}.{field_name}\" references unknown enum \"{enum_name}\""
                ))
            })?;
            ScalarType::Enum(Arc::clone(meta))
        }
    };
    let column = match (&field.column, config.transform_field_names) {
        (Some(column), _) => column.clone(),
        (None, Some(transform)) => transform.apply(field_name),
        (None, None) => field_name.to_string(),
    };
    Ok(FieldMeta {
        name: field_name.to_string(),
        column,
        ty: FieldType {
            scalar,
            list: field.list,
        },
        nullable: field.nullable,
        has_default: field.has_default,
        depends_on: field.depends_on.clone(),
    })
}

fn build_association(
    model_name: &str,
    assoc_name: &str,
    assoc: &AssociationConfig,
) -> Result<Association> {
    let pair = |i: usize| JoinPair {
        from: assoc.on[i].from.clone(),
        to: assoc.on[i].to.clone(),
    };
    let join = match (&assoc.through, assoc.on.len()) {
        (None, 1) => AssociationJoin::Direct(pair(0)),
        (Some(table), 2) => AssociationJoin::Through {
            table: table.clone(),
            pairs: [pair(0), pair(1)],
        },
        (None, n) => {
            return Err(config_error(format!(
                "Association \"{model_name}.{assoc_name}\" needs exactly one join pair, found {n}"
            )));
        }
        (Some(_), n) => {
            return Err(config_error(format!(
                "Association \"{model_name}.{assoc_name}\" uses a junction table and needs exactly two join pairs, found {n}"
            )));
        }
    };
    Ok(Association {
        name: assoc_name.to_string(),
        model: assoc.model.clone(),
        join,
        cardinality: if assoc.many {
            Cardinality::Many
        } else {
            Cardinality::One
        },
        paginated: assoc.paginate,
    })
}

fn config_error(message: String) -> Error {
    Error::Config(ConfigError::new(message))
}
