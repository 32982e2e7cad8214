//! Filter expressions.
//!
//! A filter arrives as an untyped JSON mapping and is parsed once against the
//! registry into a [`Filter`] tree. Parsing is where untrusted input is
//! sanitized: unknown keys, operators that are illegal for the field's type
//! and malformed operands are dropped here, so the compiler only ever sees
//! well-typed conditions.

use crate::aggregate::{AggregateFunction, AggregateTerm};
use serde_json::{Map, Value as JsonValue};
use sqlmancer_core::operators::{is_legal, numeric_aggregate_operators, operators_for};
use sqlmancer_core::{
    Association, CompileError, Error, FieldMeta, ModelMeta, Operator, Registry, Result,
};

/// A parsed filter: its conditions are AND-ed.
#[derive(Debug, Clone, Default)]
pub struct Filter<'r> {
    pub conditions: Vec<Condition<'r>>,
}

/// One key of a filter mapping.
#[derive(Debug, Clone)]
pub enum Condition<'r> {
    And(Vec<Filter<'r>>),
    Or(Vec<Filter<'r>>),
    Not(Box<Filter<'r>>),
    Field {
        field: &'r FieldMeta,
        ops: Vec<Comparison>,
    },
    Association {
        association: &'r Association,
        target: &'r ModelMeta,
        filter: Filter<'r>,
        aggregates: Vec<AggregatePredicate<'r>>,
    },
}

/// One operator of an operator map with its operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub op: Operator,
    pub value: JsonValue,
}

/// An aggregate over an association's rows compared with an operator map.
#[derive(Debug, Clone)]
pub struct AggregatePredicate<'r> {
    pub term: AggregateTerm<'r>,
    pub ops: Vec<Comparison>,
}

impl<'r> Filter<'r> {
    /// Parse a filter mapping for `model`.
    ///
    /// `null` is the empty filter. Anything other than a mapping or `null` at
    /// the top level is rejected; below the top level malformed entries are
    /// dropped.
    pub fn parse(registry: &'r Registry, model: &'r ModelMeta, json: &JsonValue) -> Result<Self> {
        match json {
            JsonValue::Null => Ok(Filter::default()),
            JsonValue::Object(map) => Ok(Parser { registry }.object(model, map, false).0),
            other => Err(Error::Compile(CompileError::invalid_input(format!(
                "where must be an object, got {other}"
            )))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

struct Parser<'r> {
    registry: &'r Registry,
}

impl<'r> Parser<'r> {
    fn object(
        &self,
        model: &'r ModelMeta,
        map: &Map<String, JsonValue>,
        allow_aggregates: bool,
    ) -> (Filter<'r>, Vec<AggregatePredicate<'r>>) {
        let mut conditions = Vec::new();
        let mut aggregates = Vec::new();

        for (key, value) in map {
            match key.as_str() {
                "and" | "or" => {
                    let Some(items) = value.as_array() else {
                        tracing::trace!(model = model.name(), key = %key, "Dropping non-list combinator");
                        continue;
                    };
                    let children = items
                        .iter()
                        .filter_map(JsonValue::as_object)
                        .map(|child| self.object(model, child, false).0)
                        .collect();
                    conditions.push(if key == "and" {
                        Condition::And(children)
                    } else {
                        Condition::Or(children)
                    });
                }
                "not" => {
                    if let Some(child) = value.as_object() {
                        let (child, _) = self.object(model, child, false);
                        conditions.push(Condition::Not(Box::new(child)));
                    }
                }
                _ if allow_aggregates && AggregateFunction::from_name(key).is_some() => {
                    if let Some(function) = AggregateFunction::from_name(key) {
                        self.aggregate(model, function, value, &mut aggregates);
                    }
                }
                _ => {
                    if let Some(field) = model.field(key) {
                        let ops = self.operator_map(value, |op| {
                            is_legal(op, &field.ty, self.registry.dialect())
                        });
                        if !ops.is_empty() {
                            conditions.push(Condition::Field { field, ops });
                        }
                    } else if let Some(association) = model.association(key) {
                        let (Some(target), Some(nested)) =
                            (self.registry.model(&association.model), value.as_object())
                        else {
                            continue;
                        };
                        let (filter, aggregates) =
                            self.object(target, nested, association.is_many());
                        conditions.push(Condition::Association {
                            association,
                            target,
                            filter,
                            aggregates,
                        });
                    } else {
                        tracing::trace!(model = model.name(), key = %key, "Dropping unknown filter key");
                    }
                }
            }
        }

        (Filter { conditions }, aggregates)
    }

    fn aggregate(
        &self,
        target: &'r ModelMeta,
        function: AggregateFunction,
        value: &JsonValue,
        out: &mut Vec<AggregatePredicate<'r>>,
    ) {
        if function == AggregateFunction::Count {
            let ops = self.operator_map(value, |op| numeric_aggregate_operators().contains(&op));
            if !ops.is_empty() {
                out.push(AggregatePredicate {
                    term: AggregateTerm::count(),
                    ops,
                });
            }
            return;
        }

        let Some(fields) = value.as_object() else {
            return;
        };
        for (name, op_map) in fields {
            let Some(term) = AggregateTerm::resolve(function, target, name) else {
                tracing::trace!(model = target.name(), field = %name, function = function.name(), "Dropping aggregate on unsupported field");
                continue;
            };
            let ops = self.operator_map(op_map, |op| match function {
                AggregateFunction::Avg | AggregateFunction::Sum => {
                    numeric_aggregate_operators().contains(&op)
                }
                _ => term
                    .field
                    .is_some_and(|f| operators_for(&f.ty, self.registry.dialect()).contains(&op)),
            });
            if !ops.is_empty() {
                out.push(AggregatePredicate { term, ops });
            }
        }
    }

    fn operator_map(&self, value: &JsonValue, legal: impl Fn(Operator) -> bool) -> Vec<Comparison> {
        let Some(map) = value.as_object() else {
            return Vec::new();
        };
        map.iter()
            .filter_map(|(name, operand)| match Operator::from_name(name) {
                Some(op) if legal(op) => Some(Comparison {
                    op,
                    value: operand.clone(),
                }),
                _ => {
                    tracing::trace!(operator = %name, "Dropping unsupported operator");
                    None
                }
            })
            .collect()
    }
}
