//! Compilation context and the where compiler.
//!
//! A [`Context`] lives for the compilation of one statement. It hoists CTE
//! model sources into a single WITH clause and builds association joins and
//! correlated subqueries for the where, order and selection compilers.
//!
//! Aliases are derived from the association path: the base model is aliased
//! by its name and every hop appends `__<association>`, so `Film` joined to
//! its language is `Film__language`. A junction table is aliased
//! `<path>__through`.

use crate::aggregate::{AggregateFunction, AggregateTerm};
use crate::expr::{BinaryOp, Expr};
use crate::filter::{AggregatePredicate, Comparison, Condition, Filter};
use crate::join::{Join, JoinSet};
use crate::select::{SelectItem, SelectQuery};
use crate::statement::Cte;
use serde_json::Value as JsonValue;
use sqlmancer_core::{
    Association, AssociationJoin, Dialect, FieldMeta, ModelMeta, ModelSource, Operator, Registry,
    ScalarType, Value,
};

/// A correlated subquery over the target rows of an association.
pub(crate) struct Correlated {
    pub query: SelectQuery,
    /// Alias of the target rows inside the subquery
    pub alias: String,
    /// Target-side column the subquery is correlated on
    pub key: Expr,
}

pub(crate) struct Context<'r> {
    pub registry: &'r Registry,
    pub dialect: Dialect,
    ctes: Vec<Cte>,
}

impl<'r> Context<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            dialect: registry.dialect(),
            ctes: Vec::new(),
        }
    }

    pub fn into_ctes(self) -> Vec<Cte> {
        self.ctes
    }

    /// The name a model's rows are selected from, hoisting CTE sources.
    pub fn source(&mut self, model: &ModelMeta) -> String {
        match model.source() {
            ModelSource::Table(table) => table.clone(),
            ModelSource::Cte(sql) => {
                if !self.ctes.iter().any(|c| c.name == model.name()) {
                    self.ctes.push(Cte {
                        name: model.name().to_string(),
                        sql: sql.clone(),
                    });
                }
                model.name().to_string()
            }
        }
    }

    /// A query over `model` aliased by its name.
    pub fn base_query(&mut self, model: &ModelMeta) -> SelectQuery {
        let table = self.source(model);
        SelectQuery::from_table(table, model.name())
    }

    /// LEFT JOIN the target of an association into `joins`, returning its
    /// alias. Joining the same path twice reuses the first join.
    pub fn join_association(
        &mut self,
        joins: &mut JoinSet,
        owner_alias: &str,
        association: &Association,
        target: &ModelMeta,
    ) -> String {
        let alias = format!("{owner_alias}__{}", association.name);
        if joins.contains(&alias) {
            return alias;
        }
        let table = self.source(target);
        match &association.join {
            AssociationJoin::Direct(pair) => {
                joins.add(Join::left(
                    table,
                    &alias,
                    Expr::qualified(&alias, &pair.to).eq(Expr::qualified(owner_alias, &pair.from)),
                ));
            }
            AssociationJoin::Through {
                table: through,
                pairs,
            } => {
                let through_alias = format!("{alias}__through");
                joins.add(Join::left(
                    through.clone(),
                    &through_alias,
                    Expr::qualified(&through_alias, &pairs[0].to)
                        .eq(Expr::qualified(owner_alias, &pairs[0].from)),
                ));
                joins.add(Join::left(
                    table,
                    &alias,
                    Expr::qualified(&alias, &pairs[1].to)
                        .eq(Expr::qualified(&through_alias, &pairs[1].from)),
                ));
            }
        }
        tracing::trace!(alias = %alias, "Joined association");
        alias
    }

    /// `SELECT ... FROM target [INNER JOIN through] WHERE <correlation>`,
    /// without a projection.
    pub fn correlated(
        &mut self,
        owner_alias: &str,
        association: &Association,
        target: &ModelMeta,
    ) -> Correlated {
        let alias = format!("{owner_alias}__{}", association.name);
        let table = self.source(target);
        let query = SelectQuery::from_table(table, &alias);
        match &association.join {
            AssociationJoin::Direct(pair) => {
                let key = Expr::qualified(&alias, &pair.to);
                Correlated {
                    query: query.filter(key.clone().eq(Expr::qualified(owner_alias, &pair.from))),
                    alias,
                    key,
                }
            }
            AssociationJoin::Through {
                table: through,
                pairs,
            } => {
                let through_alias = format!("{alias}__through");
                let key = Expr::qualified(&through_alias, &pairs[0].to);
                let query = query
                    .join(Join::inner(
                        through.clone(),
                        &through_alias,
                        Expr::qualified(&through_alias, &pairs[1].from)
                            .eq(Expr::qualified(&alias, &pairs[1].to)),
                    ))
                    .filter(key.clone().eq(Expr::qualified(owner_alias, &pairs[0].from)));
                Correlated { query, alias, key }
            }
        }
    }

    /// A correlated aggregate over an association's rows as a scalar value.
    /// `count` is coalesced so that "no related rows" compares as zero.
    pub fn aggregate_value(
        &mut self,
        owner_alias: &str,
        association: &Association,
        target: &ModelMeta,
        term: &AggregateTerm<'_>,
    ) -> Expr {
        let Correlated {
            mut query,
            alias,
            key,
        } = self.correlated(owner_alias, association, target);
        query.columns.push(SelectItem::new(term.expr(&alias)));
        query.group_by.push(key);
        let value = Expr::subquery(query);
        if term.function == AggregateFunction::Count {
            Expr::function("COALESCE", vec![value, Expr::raw("0")])
        } else {
            value
        }
    }

    /// Restrict the rows of `alias` (an association target) to those related
    /// to the parent row whose key is `parent_key`.
    pub fn scope_predicate(&self, alias: &str, association: &Association, parent_key: Value) -> Expr {
        match &association.join {
            AssociationJoin::Direct(pair) => Expr::qualified(alias, &pair.to).eq(Expr::lit(parent_key)),
            AssociationJoin::Through { table, pairs } => {
                let keys = SelectQuery::from_table(table.clone(), table.clone())
                    .column(SelectItem::new(Expr::qualified(table, &pairs[1].from)))
                    .filter(Expr::qualified(table, &pairs[0].to).eq(Expr::lit(parent_key)));
                Expr::qualified(alias, &pairs[1].to).in_subquery(keys)
            }
        }
    }

    // ==================== Where compiler ====================

    /// Compile a filter over rows aliased `alias`. Joins it needs are added
    /// to `joins`. `None` when the filter yields no condition.
    pub fn compile_filter(
        &mut self,
        joins: &mut JoinSet,
        model: &'r ModelMeta,
        alias: &str,
        filter: &Filter<'r>,
    ) -> Option<Expr> {
        let terms = filter
            .conditions
            .iter()
            .filter_map(|condition| self.compile_condition(joins, model, alias, condition))
            .collect();
        Expr::all(terms)
    }

    fn compile_condition(
        &mut self,
        joins: &mut JoinSet,
        model: &'r ModelMeta,
        alias: &str,
        condition: &Condition<'r>,
    ) -> Option<Expr> {
        match condition {
            Condition::And(children) | Condition::Or(children) => {
                let terms: Vec<_> = children
                    .iter()
                    .map(|child| {
                        self.compile_filter(joins, model, alias, child)
                            .unwrap_or_else(Expr::always)
                    })
                    .collect();
                if terms.is_empty() {
                    return Some(Expr::always());
                }
                Some(if matches!(condition, Condition::And(_)) {
                    Expr::And(terms)
                } else {
                    Expr::Or(terms)
                })
            }
            Condition::Not(child) => self.compile_filter(joins, model, alias, child).map(Expr::not),
            Condition::Field { field, ops } => {
                let terms = ops
                    .iter()
                    .map(|cmp| self.field_comparison(Expr::qualified(alias, &field.column), field, cmp))
                    .collect();
                Expr::all(terms)
            }
            Condition::Association {
                association,
                target,
                filter,
                aggregates,
            } => {
                let mut terms = Vec::new();
                if !filter.is_empty() {
                    if fans_out(association) {
                        terms.extend(self.exists(alias, association, target, filter));
                    } else {
                        let target_alias = self.join_association(joins, alias, association, target);
                        terms.extend(self.compile_filter(joins, target, &target_alias, filter));
                    }
                }
                for predicate in aggregates {
                    terms.extend(self.aggregate_predicate(alias, association, target, predicate));
                }
                Expr::all(terms)
            }
        }
    }

    fn exists(
        &mut self,
        owner_alias: &str,
        association: &Association,
        target: &'r ModelMeta,
        filter: &Filter<'r>,
    ) -> Option<Expr> {
        let Correlated {
            mut query, alias, ..
        } = self.correlated(owner_alias, association, target);
        let mut nested_joins = JoinSet::new();
        let nested = self.compile_filter(&mut nested_joins, target, &alias, filter)?;
        query.columns.push(SelectItem::new(Expr::raw("1")));
        query.joins.extend(nested_joins.into_vec());
        Some(Expr::exists(query.filter(nested)))
    }

    fn aggregate_predicate(
        &mut self,
        owner_alias: &str,
        association: &Association,
        target: &ModelMeta,
        predicate: &AggregatePredicate<'_>,
    ) -> Option<Expr> {
        let value = self.aggregate_value(owner_alias, association, target, &predicate.term);
        let terms = predicate
            .ops
            .iter()
            .map(|cmp| match (predicate.term.function, predicate.term.field) {
                (AggregateFunction::Min | AggregateFunction::Max, Some(field)) => {
                    self.compare(value.clone(), cmp, &|v| self.lower(field, v))
                }
                _ => self.compare(value.clone(), cmp, &Value::from_json),
            })
            .collect();
        Expr::all(terms)
    }

    // ==================== Comparisons ====================

    fn field_comparison(&self, column: Expr, field: &FieldMeta, cmp: &Comparison) -> Expr {
        if cmp.value.is_null() {
            return null_comparison(column, cmp.op);
        }
        if field.ty.list {
            return self.list_comparison(column, field, cmp);
        }
        if field.ty.scalar == ScalarType::Json {
            return self.json_comparison(column, cmp);
        }
        self.compare(column, cmp, &|v| self.lower(field, v))
    }

    /// Scalar comparison operators shared by fields and aggregate values.
    fn compare(&self, lhs: Expr, cmp: &Comparison, lower: &dyn Fn(&JsonValue) -> Value) -> Expr {
        if cmp.value.is_null() {
            return null_comparison(lhs, cmp.op);
        }
        let operand = || Expr::lit(lower(&cmp.value));
        match cmp.op {
            Operator::Equal => lhs.eq(operand()),
            Operator::NotEqual => lhs.ne(operand()),
            Operator::GreaterThan => lhs.binary(BinaryOp::Gt, operand()),
            Operator::GreaterThanOrEqual => lhs.binary(BinaryOp::Ge, operand()),
            Operator::LessThan => lhs.binary(BinaryOp::Lt, operand()),
            Operator::LessThanOrEqual => lhs.binary(BinaryOp::Le, operand()),
            Operator::In | Operator::NotIn => {
                let values: Vec<_> = as_list(&cmp.value)
                    .iter()
                    .map(|v| Expr::lit(lower(v)))
                    .collect();
                match (cmp.op, values.is_empty()) {
                    (Operator::In, true) => Expr::never(),
                    (_, true) => Expr::always(),
                    (Operator::In, false) => lhs.in_list(values),
                    (_, false) => lhs.not_in_list(values),
                }
            }
            Operator::Like | Operator::NotLike | Operator::ILike | Operator::NotILike => Expr::Like {
                expr: Box::new(lhs),
                pattern: Box::new(operand()),
                negated: matches!(cmp.op, Operator::NotLike | Operator::NotILike),
                case_insensitive: matches!(cmp.op, Operator::ILike | Operator::NotILike),
            },
            Operator::Contains
            | Operator::ContainedBy
            | Operator::Overlaps
            | Operator::HasKey
            | Operator::HasAnyKeys
            | Operator::HasAllKeys => Expr::never(),
        }
    }

    fn json_comparison(&self, column: Expr, cmp: &Comparison) -> Expr {
        let dialect = self.dialect;
        let document = || match dialect {
            Dialect::Postgres => Value::Json(cmp.value.clone()),
            _ => Value::Text(cmp.value.to_string()),
        };
        match cmp.op {
            Operator::Equal | Operator::NotEqual => {
                let equal = self.json_equal(column, Expr::lit(document()));
                if cmp.op == Operator::Equal {
                    equal
                } else {
                    equal.not()
                }
            }
            Operator::Contains | Operator::ContainedBy => {
                let (outer, inner) = if cmp.op == Operator::Contains {
                    (column, Expr::lit(document()))
                } else {
                    (Expr::lit(document()), column)
                };
                match dialect {
                    Dialect::Postgres => outer.binary(BinaryOp::Contains, inner),
                    _ => Expr::function("JSON_CONTAINS", vec![outer, inner]),
                }
            }
            Operator::HasKey | Operator::HasAnyKeys | Operator::HasAllKeys => {
                let keys: Vec<String> = match cmp.op {
                    Operator::HasKey => cmp.value.as_str().map(str::to_string).into_iter().collect(),
                    _ => as_list(&cmp.value)
                        .iter()
                        .filter_map(|k| k.as_str().map(str::to_string))
                        .collect(),
                };
                if keys.is_empty() {
                    return if cmp.op == Operator::HasAllKeys {
                        Expr::always()
                    } else {
                        Expr::never()
                    };
                }
                self.json_has_keys(column, cmp.op, keys)
            }
            _ => Expr::never(),
        }
    }

    fn json_equal(&self, column: Expr, document: Expr) -> Expr {
        match self.dialect {
            Dialect::Postgres => column.eq(document),
            Dialect::Mysql => column.eq(document.cast("JSON")),
            Dialect::Mariadb => Expr::function("JSON_EQUALS", vec![column, document]),
            Dialect::Sqlite => Expr::function("json", vec![column])
                .eq(Expr::function("json", vec![document])),
        }
    }

    fn json_has_keys(&self, column: Expr, op: Operator, keys: Vec<String>) -> Expr {
        match self.dialect {
            Dialect::Postgres => match op {
                Operator::HasKey => Expr::function(
                    "jsonb_exists",
                    vec![column, Expr::lit(Value::Text(keys.concat()))],
                ),
                _ => {
                    let name = if op == Operator::HasAllKeys {
                        "jsonb_exists_all"
                    } else {
                        "jsonb_exists_any"
                    };
                    let keys = Value::Array(keys.into_iter().map(Value::Text).collect());
                    Expr::function(name, vec![column, Expr::lit(keys)])
                }
            },
            _ => {
                let mode = if op == Operator::HasAllKeys { "'all'" } else { "'one'" };
                let mut args = vec![column, Expr::raw(mode)];
                args.extend(keys.iter().map(|k| Expr::lit(Value::Text(json_path(k)))));
                Expr::function("JSON_CONTAINS_PATH", args)
            }
        }
    }

    fn list_comparison(&self, column: Expr, field: &FieldMeta, cmp: &Comparison) -> Expr {
        let items: Vec<Value> = as_list(&cmp.value)
            .iter()
            .map(|v| self.lower(field, v))
            .collect();
        let list = || match self.dialect {
            Dialect::Postgres => Expr::lit(Value::Array(items.clone())),
            _ => Expr::lit(Value::Text(
                JsonValue::Array(items.iter().map(Value::to_json).collect()).to_string(),
            )),
        };
        match (self.dialect, cmp.op) {
            (_, Operator::Equal) => self.json_equal_list(column, list()),
            (_, Operator::NotEqual) => self.json_equal_list(column, list()).not(),
            (Dialect::Postgres, Operator::Contains) => column.binary(BinaryOp::Contains, list()),
            (Dialect::Postgres, Operator::ContainedBy) => {
                column.binary(BinaryOp::ContainedBy, list())
            }
            (Dialect::Postgres, Operator::Overlaps) => column.binary(BinaryOp::Overlaps, list()),
            (Dialect::Sqlite, Operator::Contains) => Expr::Sequence(vec![
                Expr::raw("NOT EXISTS (SELECT 1 FROM json_each("),
                list(),
                Expr::raw(
                    ") AS \"v\" WHERE \"v\".\"value\" NOT IN (SELECT \"c\".\"value\" FROM json_each(",
                ),
                column,
                Expr::raw(") AS \"c\"))"),
            ]),
            (Dialect::Sqlite, Operator::ContainedBy) => Expr::Sequence(vec![
                Expr::raw("NOT EXISTS (SELECT 1 FROM json_each("),
                column,
                Expr::raw(
                    ") AS \"c\" WHERE \"c\".\"value\" NOT IN (SELECT \"v\".\"value\" FROM json_each(",
                ),
                list(),
                Expr::raw(") AS \"v\"))"),
            ]),
            (Dialect::Sqlite, Operator::Overlaps) => Expr::Sequence(vec![
                Expr::raw("EXISTS (SELECT 1 FROM json_each("),
                column,
                Expr::raw(") AS \"c\" INNER JOIN json_each("),
                list(),
                Expr::raw(") AS \"v\" ON \"c\".\"value\" = \"v\".\"value\")"),
            ]),
            (_, Operator::Contains) => Expr::function("JSON_CONTAINS", vec![column, list()]),
            (_, Operator::ContainedBy) => Expr::function("JSON_CONTAINS", vec![list(), column]),
            (_, Operator::Overlaps) => Expr::function("JSON_OVERLAPS", vec![column, list()]),
            _ => Expr::never(),
        }
    }

    fn json_equal_list(&self, column: Expr, list: Expr) -> Expr {
        match self.dialect {
            Dialect::Postgres => column.eq(list),
            _ => self.json_equal(column, list),
        }
    }

    /// Lower a filter operand for `field` into a bind value.
    pub fn lower(&self, field: &FieldMeta, value: &JsonValue) -> Value {
        match (&field.ty.scalar, value) {
            (ScalarType::Enum(meta), JsonValue::String(public)) => Value::Text(
                meta.to_stored(public)
                    .map_or_else(|| public.clone(), str::to_string),
            ),
            _ => Value::from_json(value),
        }
    }
}

/// Whether following `association` can yield more than one row per parent.
pub(crate) fn fans_out(association: &Association) -> bool {
    association.is_many() || association.through_table().is_some()
}

fn null_comparison(column: Expr, op: Operator) -> Expr {
    match op {
        Operator::Equal => column.is_null(),
        Operator::NotEqual => column.is_not_null(),
        _ => Expr::never(),
    }
}

fn as_list(value: &JsonValue) -> Vec<JsonValue> {
    match value {
        JsonValue::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// MySQL JSON path for a top-level key.
fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
}
