//! Selection planning.
//!
//! A [`Selection`] names the fields and associations a caller wants back.
//! Planning turns it into the column list of one statement:
//!
//! - `one` associations are LEFT JOINed and flattened into the row, aliased
//!   by output path (`language__name`)
//! - associations that fan out select a hidden `@<path>` key column instead
//!   and are resolved afterwards by a child query per parent row
//!
//! Decoding walks the same plan to turn a flat row back into a nested record.

use crate::aggregate::AggregateRequest;
use crate::compile::{Context, fans_out};
use crate::expr::Expr;
use crate::join::JoinSet;
use crate::output::{Record, decode_field};
use crate::select::SelectItem;
use serde_json::Value as JsonValue;
use sqlmancer_core::{
    Association, CompileError, Error, FieldMeta, ModelMeta, Result, Row,
};

/// The requested projection of a model.
///
/// An empty field list selects every field of the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub fields: Vec<String>,
    pub associations: Vec<(String, AssociationSelection)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn association(mut self, name: impl Into<String>, selection: AssociationSelection) -> Self {
        self.associations.push((name.into(), selection));
        self
    }
}

/// The projection of an association plus the arguments of its child query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationSelection {
    pub selection: Selection,
    pub args: AssociationArgs,
}

/// Arguments applied when an association is resolved by a child query.
///
/// They have no effect on `one` associations, which are joined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationArgs {
    pub where_: Option<JsonValue>,
    pub order_by: Option<JsonValue>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Page aggregate, for paginated associations
    pub aggregate: Option<AggregateRequest>,
}

impl AssociationSelection {
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            args: AssociationArgs::default(),
        }
    }

    pub fn where_(mut self, filter: JsonValue) -> Self {
        self.args.where_ = Some(filter);
        self
    }

    pub fn order_by(mut self, order: JsonValue) -> Self {
        self.args.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.args.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.args.offset = Some(offset);
        self
    }

    pub fn aggregate(mut self, request: AggregateRequest) -> Self {
        self.args.aggregate = Some(request);
        self
    }
}

/// How one level of a planned selection maps back from a row.
#[derive(Debug, Clone)]
pub(crate) struct Shape<'r> {
    pub model: &'r ModelMeta,
    /// Output alias prefix of this level, empty at the root
    prefix: String,
    fields: Vec<&'r FieldMeta>,
    pub ones: Vec<(&'r Association, Shape<'r>)>,
    pub manys: Vec<ManyPlan<'r>>,
}

/// An association resolved by a child query per parent row.
#[derive(Debug, Clone)]
pub(crate) struct ManyPlan<'r> {
    pub association: &'r Association,
    pub target: &'r ModelMeta,
    /// Hidden column holding the parent key
    pub key_column: String,
    pub selection: AssociationSelection,
}

impl<'r> Context<'r> {
    /// Plan `selection` over rows of `model` aliased `alias`, pushing the
    /// projected columns and adding the joins they need.
    pub(crate) fn plan_selection(
        &mut self,
        joins: &mut JoinSet,
        model: &'r ModelMeta,
        alias: &str,
        selection: &Selection,
        columns: &mut Vec<SelectItem>,
    ) -> Result<Shape<'r>> {
        self.plan_level(joins, model, alias, "", selection, columns)
    }

    fn plan_level(
        &mut self,
        joins: &mut JoinSet,
        model: &'r ModelMeta,
        alias: &str,
        prefix: &str,
        selection: &Selection,
        columns: &mut Vec<SelectItem>,
    ) -> Result<Shape<'r>> {
        let mut fields: Vec<&'r FieldMeta> = vec![model.pk()];
        let mut push = |field: &'r FieldMeta| {
            if !fields.iter().any(|f| f.name == field.name) {
                fields.push(field);
            }
        };
        if selection.fields.is_empty() {
            model.fields().for_each(&mut push);
        } else {
            for name in &selection.fields {
                let field = model
                    .field(name)
                    .ok_or_else(|| Error::Compile(CompileError::invalid_field_name(name)))?;
                push(field);
            }
        }
        for name in model.include() {
            if let Some(field) = model.field(name) {
                push(field);
            }
        }

        columns.extend(fields.iter().map(|field| {
            SelectItem::aliased(
                Expr::qualified(alias, &field.column),
                format!("{prefix}{}", field.name),
            )
        }));

        let mut ones = Vec::new();
        let mut manys = Vec::new();
        for (name, nested) in &selection.associations {
            let association = model
                .association(name)
                .ok_or_else(|| Error::Compile(CompileError::invalid_field_name(name)))?;
            let target = self.registry.require_model(&association.model)?;
            if fans_out(association) {
                let key_column = format!("@{prefix}{name}");
                columns.push(SelectItem::aliased(
                    Expr::qualified(alias, association.parent_key()),
                    key_column.clone(),
                ));
                manys.push(ManyPlan {
                    association,
                    target,
                    key_column,
                    selection: nested.clone(),
                });
            } else {
                let target_alias = self.join_association(joins, alias, association, target);
                let shape = self.plan_level(
                    joins,
                    target,
                    &target_alias,
                    &format!("{prefix}{name}__"),
                    &nested.selection,
                    columns,
                )?;
                ones.push((association, shape));
            }
        }
        tracing::trace!(
            model = model.name(),
            fields = fields.len(),
            joined = ones.len(),
            deferred = manys.len(),
            "Planned selection"
        );

        Ok(Shape {
            model,
            prefix: prefix.to_string(),
            fields,
            ones,
            manys,
        })
    }
}

impl Shape<'_> {
    /// Decode the root level of a row. Hidden key columns are not copied.
    pub(crate) fn decode_root(&self, row: &Row) -> Record {
        self.decode(row).unwrap_or_default()
    }

    /// Decode this level; `None` for a joined association whose primary key
    /// came back NULL.
    fn decode(&self, row: &Row) -> Option<Record> {
        if !self.prefix.is_empty() {
            let pk = row.get_by_name(&format!("{}{}", self.prefix, self.model.pk().name));
            if pk.is_none_or(sqlmancer_core::Value::is_null) {
                return None;
            }
        }
        let mut record = Record::new();
        for field in &self.fields {
            let value = row
                .get_by_name(&format!("{}{}", self.prefix, field.name))
                .map_or(JsonValue::Null, |v| decode_field(field, v));
            record.insert(field.name.clone(), value);
        }
        for (association, shape) in &self.ones {
            let value = shape.decode(row).map_or(JsonValue::Null, JsonValue::Object);
            record.insert(association.name.clone(), value);
        }
        Some(record)
    }

    /// Whether this level or a joined level below it defers associations.
    pub(crate) fn has_deferred(&self) -> bool {
        !self.manys.is_empty() || self.ones.iter().any(|(_, shape)| shape.has_deferred())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Statement;
    use crate::testing::sakila;
    use serde_json::json;
    use sqlmancer_core::{Registry, Value};

    fn plan<'r>(
        registry: &'r Registry,
        model: &str,
        selection: &Selection,
    ) -> Result<(Statement, Shape<'r>)> {
        let model = registry.model(model).unwrap();
        let mut ctx = Context::new(registry);
        let mut joins = JoinSet::new();
        let mut query = ctx.base_query(model);
        let shape = ctx.plan_selection(&mut joins, model, model.name(), selection, &mut query.columns)?;
        query.joins = joins.into_vec();
        let ctes = ctx.into_ctes();
        Ok((Statement::select(registry.dialect(), &ctes, &query), shape))
    }

    #[test]
    fn test_default_selects_every_field() {
        let registry = sakila();
        let (stmt, _) = plan(&registry, "Language", &Selection::new()).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"Language\".\"language_id\" AS \"id\", \"Language\".\"name\" AS \"name\" \
             FROM \"language\" AS \"Language\""
        );
    }

    #[test]
    fn test_one_association_flattened() {
        let registry = sakila();
        let selection = Selection::new().field("title").association(
            "language",
            AssociationSelection::new(Selection::new().field("name")),
        );
        let (stmt, shape) = plan(&registry, "Film", &selection).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"Film\".\"film_id\" AS \"id\", \"Film\".\"title\" AS \"title\", \
             \"Film__language\".\"language_id\" AS \"language__id\", \
             \"Film__language\".\"name\" AS \"language__name\" \
             FROM \"film\" AS \"Film\" \
             LEFT JOIN \"language\" AS \"Film__language\" ON \"Film__language\".\"language_id\" = \"Film\".\"language_id\""
        );

        let row = Row::new(
            vec!["id".into(), "title".into(), "language__id".into(), "language__name".into()],
            vec![Value::BigInt(1), Value::from("ACADEMY DINOSAUR"), Value::BigInt(1), Value::from("English")],
        );
        assert_eq!(
            JsonValue::Object(shape.decode_root(&row)),
            json!({ "id": 1, "title": "ACADEMY DINOSAUR", "language": { "id": 1, "name": "English" } })
        );

        let row = Row::new(
            vec!["id".into(), "title".into(), "language__id".into(), "language__name".into()],
            vec![Value::BigInt(2), Value::from("X"), Value::Null, Value::Null],
        );
        assert_eq!(
            JsonValue::Object(shape.decode_root(&row)),
            json!({ "id": 2, "title": "X", "language": null })
        );
    }

    #[test]
    fn test_many_association_uses_hidden_key() {
        let registry = sakila();
        let selection = Selection::new().field("name").association(
            "films",
            AssociationSelection::new(Selection::new().field("title")).limit(2),
        );
        let (stmt, shape) = plan(&registry, "Language", &selection).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"Language\".\"language_id\" AS \"id\", \"Language\".\"name\" AS \"name\", \
             \"Language\".\"language_id\" AS \"@films\" FROM \"language\" AS \"Language\""
        );
        assert_eq!(shape.manys.len(), 1);
        assert_eq!(shape.manys[0].key_column, "@films");
        assert!(shape.has_deferred());

        let row = Row::new(
            vec!["id".into(), "name".into(), "@films".into()],
            vec![Value::BigInt(1), Value::from("English"), Value::BigInt(1)],
        );
        let record = shape.decode_root(&row);
        assert!(!record.contains_key("@films"));
        assert!(!record.contains_key("films"));
    }

    #[test]
    fn test_nested_deferred_key_is_path_prefixed() {
        let registry = sakila();
        let selection = Selection::new().association(
            "language",
            AssociationSelection::new(Selection::new().association(
                "films",
                AssociationSelection::new(Selection::new()),
            )),
        );
        let (stmt, shape) = plan(&registry, "Film", &selection).unwrap();
        assert!(
            stmt.sql.contains("\"Film__language\".\"language_id\" AS \"@language__films\""),
            "{}",
            stmt.sql
        );
        assert!(shape.manys.is_empty());
        assert!(shape.has_deferred());
    }

    #[test]
    fn test_unknown_selected_field() {
        let registry = sakila();
        let err = plan(&registry, "Film", &Selection::new().field("bogus")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid field name \"bogus\"");
    }
}
