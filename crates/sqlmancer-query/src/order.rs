//! OrderBy expressions.
//!
//! Unlike filters, sort directives are strict: an unknown field anywhere in a
//! directive fails compilation with `Invalid field name "<key>"`.

use crate::aggregate::{AggregateFunction, AggregateTerm};
use crate::clause::{OrderBy, OrderDirection};
use crate::compile::{Context, Correlated, fans_out};
use crate::expr::Expr;
use crate::join::JoinSet;
use crate::select::SelectItem;
use serde_json::{Map, Value as JsonValue};
use sqlmancer_core::{
    Association, CompileError, Error, FieldMeta, ModelMeta, Registry, Result,
};

/// One parsed sort directive.
#[derive(Debug, Clone)]
pub enum SortTerm<'r> {
    Field {
        field: &'r FieldMeta,
        direction: OrderDirection,
    },
    Association {
        association: &'r Association,
        target: &'r ModelMeta,
        term: Box<SortTerm<'r>>,
    },
    /// A field of the rows behind an association that fans out
    Related {
        association: &'r Association,
        target: &'r ModelMeta,
        field: &'r FieldMeta,
        direction: OrderDirection,
    },
    Aggregate {
        association: &'r Association,
        target: &'r ModelMeta,
        term: AggregateTerm<'r>,
        direction: OrderDirection,
    },
}

/// An ordered sequence of sort directives.
#[derive(Debug, Clone, Default)]
pub struct OrderSpec<'r> {
    pub terms: Vec<SortTerm<'r>>,
}

impl<'r> OrderSpec<'r> {
    /// Parse `[{key: "ASC"}, {assoc: {key: "DESC"}}, ...]` for `model`.
    ///
    /// A single directive object is accepted in place of a one-element list.
    pub fn parse(registry: &'r Registry, model: &'r ModelMeta, json: &JsonValue) -> Result<Self> {
        let directives: Vec<&Map<String, JsonValue>> = match json {
            JsonValue::Null => Vec::new(),
            JsonValue::Object(map) => vec![map],
            JsonValue::Array(items) => items
                .iter()
                .map(|item| item.as_object().ok_or_else(|| invalid_input(item)))
                .collect::<Result<_>>()?,
            other => return Err(invalid_input(other)),
        };

        let mut terms = Vec::new();
        for directive in directives {
            // every key is validated; the last one in map order is kept
            let mut last = None;
            for (key, value) in directive {
                if let Some(term) = parse_key(registry, model, key, value)? {
                    last = Some(term);
                }
            }
            terms.extend(last);
        }
        Ok(Self { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn invalid_input(value: &JsonValue) -> Error {
    Error::Compile(CompileError::invalid_input(format!(
        "orderBy must be a list of objects, got {value}"
    )))
}

fn invalid_field(key: &str) -> Error {
    Error::Compile(CompileError::invalid_field_name(key))
}

fn direction(value: &JsonValue) -> Result<OrderDirection> {
    match value.as_str() {
        Some(s) => OrderDirection::parse(s).map_err(Error::Compile),
        None => Err(Error::Compile(CompileError::invalid_direction(
            &value.to_string(),
        ))),
    }
}

fn parse_key<'r>(
    registry: &'r Registry,
    model: &'r ModelMeta,
    key: &str,
    value: &JsonValue,
) -> Result<Option<SortTerm<'r>>> {
    if let Some(field) = model.field(key) {
        return Ok(Some(SortTerm::Field {
            field,
            direction: direction(value)?,
        }));
    }
    let Some(association) = model.association(key) else {
        return Err(invalid_field(key));
    };
    let target = registry.require_model(&association.model)?;
    let Some(nested) = value.as_object() else {
        return Err(Error::Compile(CompileError::invalid_input(format!(
            "orderBy on association \"{key}\" must be an object"
        ))));
    };

    let mut parsed = None;
    for (nested_key, nested_value) in nested {
        let term = if fans_out(association) {
            parse_many_key(association, target, nested_key, nested_value)?
        } else {
            parse_key(registry, target, nested_key, nested_value)?.map(|term| {
                SortTerm::Association {
                    association,
                    target,
                    term: Box::new(term),
                }
            })
        };
        // one key per directive; later keys of a multi-key object win
        if term.is_some() {
            parsed = term;
        }
    }
    Ok(parsed)
}

/// Sort keys under an association that fans out: a plain field, or an
/// aggregate over the related rows.
fn parse_many_key<'r>(
    association: &'r Association,
    target: &'r ModelMeta,
    key: &str,
    value: &JsonValue,
) -> Result<Option<SortTerm<'r>>> {
    if let Some(field) = target.field(key) {
        return Ok(Some(SortTerm::Related {
            association,
            target,
            field,
            direction: direction(value)?,
        }));
    }
    let Some(function) = AggregateFunction::from_name(key) else {
        return Err(invalid_field(key));
    };
    if function == AggregateFunction::Count {
        return Ok(Some(SortTerm::Aggregate {
            association,
            target,
            term: AggregateTerm::count(),
            direction: direction(value)?,
        }));
    }
    let Some(fields) = value.as_object() else {
        return Err(Error::Compile(CompileError::invalid_input(format!(
            "orderBy aggregate \"{key}\" must name a field"
        ))));
    };
    let mut parsed = None;
    for (name, dir) in fields {
        let term = AggregateTerm::resolve(function, target, name).ok_or_else(|| invalid_field(name))?;
        parsed = Some(SortTerm::Aggregate {
            association,
            target,
            term,
            direction: direction(dir)?,
        });
    }
    Ok(parsed)
}

impl<'r> Context<'r> {
    /// Compile an order spec over rows aliased `alias`, adding the joins it
    /// needs to `joins`.
    pub fn compile_order(
        &mut self,
        joins: &mut JoinSet,
        alias: &str,
        spec: &OrderSpec<'r>,
    ) -> Vec<OrderBy> {
        spec.terms
            .iter()
            .map(|term| self.sort_term(joins, alias, term))
            .collect()
    }

    fn sort_term(&mut self, joins: &mut JoinSet, alias: &str, term: &SortTerm<'r>) -> OrderBy {
        match term {
            SortTerm::Field { field, direction } => {
                OrderBy::new(Expr::qualified(alias, &field.column), *direction)
            }
            SortTerm::Association {
                association,
                target,
                term,
            } => {
                let target_alias = self.join_association(joins, alias, association, target);
                self.sort_term(joins, &target_alias, term)
            }
            SortTerm::Related {
                association,
                target,
                field,
                direction,
            } => self.extreme_of_related(alias, association, target, field, *direction),
            SortTerm::Aggregate {
                association,
                target,
                term,
                direction,
            } => OrderBy::new(
                self.aggregate_value(alias, association, target, term),
                *direction,
            ),
        }
    }

    /// Order parents by the smallest related value ascending, or the largest
    /// descending.
    fn extreme_of_related(
        &mut self,
        alias: &str,
        association: &Association,
        target: &ModelMeta,
        field: &FieldMeta,
        direction: OrderDirection,
    ) -> OrderBy {
        let Correlated {
            mut query,
            alias: target_alias,
            key,
        } = self.correlated(alias, association, target);
        let function = match direction {
            OrderDirection::Asc => "MIN",
            OrderDirection::Desc => "MAX",
        };
        query.columns.push(SelectItem::new(Expr::function(
            function,
            vec![Expr::qualified(&target_alias, &field.column)],
        )));
        query.group_by.push(key);
        OrderBy::new(Expr::subquery(query), direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sakila;
    use serde_json::json;
    use sqlmancer_core::{CompileErrorKind, Dialect, Value};

    fn order_sql(registry: &Registry, model: &str, json: JsonValue) -> Result<(String, usize)> {
        let model = registry.model(model).unwrap();
        let spec = OrderSpec::parse(registry, model, &json)?;
        let mut ctx = Context::new(registry);
        let mut joins = JoinSet::new();
        let orders = ctx.compile_order(&mut joins, model.name(), &spec);
        let mut params: Vec<Value> = Vec::new();
        let sql: Vec<_> = orders
            .iter()
            .map(|o| o.build_with_dialect(Dialect::Sqlite, &mut params, 0))
            .collect();
        Ok((sql.join(", "), joins.len()))
    }

    #[test]
    fn test_fields_in_sequence_order() {
        let registry = sakila();
        let (sql, joins) = order_sql(
            &registry,
            "Film",
            json!([{ "length": "DESC" }, {}, { "title": "asc" }]),
        )
        .unwrap();
        assert_eq!(sql, "\"Film\".\"length\" DESC, \"Film\".\"title\" ASC");
        assert_eq!(joins, 0);
    }

    #[test]
    fn test_multi_key_directive_keeps_last_key() {
        let registry = sakila();
        // map order is alphabetical: length, then title
        let (sql, _) = order_sql(
            &registry,
            "Film",
            json!([{ "title": "ASC", "length": "DESC" }]),
        )
        .unwrap();
        assert_eq!(sql, "\"Film\".\"title\" ASC");

        let (sql, joins) = order_sql(
            &registry,
            "Film",
            json!([{ "language": { "name": "ASC", "id": "DESC" } }]),
        )
        .unwrap();
        assert_eq!(sql, "\"Film__language\".\"name\" ASC");
        assert_eq!(joins, 1);

        let err = order_sql(&registry, "Film", json!([{ "title": "ASC", "bogus": "DESC" }]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid field name \"bogus\"");
    }

    #[test]
    fn test_one_association_joins() {
        let registry = sakila();
        let (sql, joins) = order_sql(
            &registry,
            "Film",
            json!([{ "language": { "name": "ASC" } }, { "language": { "id": "DESC" } }]),
        )
        .unwrap();
        assert_eq!(
            sql,
            "\"Film__language\".\"name\" ASC, \"Film__language\".\"language_id\" DESC"
        );
        assert_eq!(joins, 1);
    }

    #[test]
    fn test_many_association_uses_extreme() {
        let registry = sakila();
        let (sql, joins) =
            order_sql(&registry, "Language", json!([{ "films": { "title": "DESC" } }])).unwrap();
        assert_eq!(
            sql,
            "(SELECT MAX(\"Language__films\".\"title\") FROM \"film\" AS \"Language__films\" \
             WHERE \"Language__films\".\"language_id\" = \"Language\".\"language_id\" \
             GROUP BY \"Language__films\".\"language_id\") DESC"
        );
        assert_eq!(joins, 0);
    }

    #[test]
    fn test_aggregate_keys() {
        let registry = sakila();
        let (sql, _) = order_sql(&registry, "Film", json!([{ "actors": { "count": "DESC" } }])).unwrap();
        assert!(sql.starts_with("COALESCE((SELECT COUNT(*) FROM \"actor\""), "{sql}");
        assert!(sql.ends_with("), 0) DESC"), "{sql}");

        let (sql, _) = order_sql(
            &registry,
            "Language",
            json!([{ "films": { "avg": { "length": "ASC" } } }]),
        )
        .unwrap();
        assert!(sql.starts_with("(SELECT AVG(\"Language__films\".\"length\")"), "{sql}");
    }

    #[test]
    fn test_unknown_fields_are_fatal() {
        let registry = sakila();
        for json in [
            json!([{ "bogus": "ASC" }]),
            json!([{ "language": { "missing": "ASC" } }]),
            json!([{ "actors": { "max": { "missing": "ASC" } } }]),
        ] {
            let err = order_sql(&registry, "Film", json).unwrap_err();
            match err {
                Error::Compile(e) => assert_eq!(e.kind, CompileErrorKind::InvalidFieldName),
                other => panic!("unexpected error {other:?}"),
            }
        }
        let err = order_sql(&registry, "Film", json!([{ "language": { "missing": "ASC" } }]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid field name \"missing\"");
    }

    #[test]
    fn test_invalid_direction() {
        let registry = sakila();
        let err = order_sql(&registry, "Film", json!([{ "title": "UP" }])).unwrap_err();
        match err {
            Error::Compile(e) => assert_eq!(e.kind, CompileErrorKind::InvalidDirection),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
