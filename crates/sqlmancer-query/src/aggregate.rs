//! Aggregate compiler.
//!
//! An [`AggregateSpec`] accumulates the functions requested on a builder.
//! `avg`/`sum` only accept a [`NumericField`] and `min`/`max` only a
//! [`ComparableField`]; both tokens come from the model's aggregate surface,
//! so an average over a text column cannot be requested in the first place.

use crate::expr::Expr;
use crate::output::{Record, decode_field, decode_number};
use crate::select::SelectItem;
use serde_json::{Map, Value as JsonValue};
use sqlmancer_core::{
    CompileError, ComparableField, Error, FieldMeta, ModelMeta, NumericField, Result, Row,
};

/// An aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateFunction::Count),
            "avg" => Some(AggregateFunction::Avg),
            "sum" => Some(AggregateFunction::Sum),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }

    pub const fn sql_name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

/// One aggregate function applied to one field (or to rows, for `count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateTerm<'r> {
    pub function: AggregateFunction,
    pub field: Option<&'r FieldMeta>,
}

impl<'r> AggregateTerm<'r> {
    pub fn count() -> Self {
        Self {
            function: AggregateFunction::Count,
            field: None,
        }
    }

    /// Resolve a function over a named field of `model`, checking the field
    /// against the function's surface.
    pub fn resolve(function: AggregateFunction, model: &'r ModelMeta, field: &str) -> Option<Self> {
        let field = match function {
            AggregateFunction::Count => return Some(Self::count()),
            AggregateFunction::Avg | AggregateFunction::Sum => model.numeric_field(field)?.field(),
            AggregateFunction::Min | AggregateFunction::Max => {
                model.comparable_field(field)?.field()
            }
        };
        Some(Self {
            function,
            field: Some(field),
        })
    }

    /// Output column alias: `count`, or `<function>__<field>`.
    pub fn alias(&self) -> String {
        match self.field {
            Some(field) => format!("{}__{}", self.function.name(), field.name),
            None => self.function.name().to_string(),
        }
    }

    /// The aggregate expression over rows aliased `table`.
    pub fn expr(&self, table: &str) -> Expr {
        match self.field {
            Some(field) => Expr::function(
                self.function.sql_name(),
                vec![Expr::qualified(table, &field.column)],
            ),
            None => Expr::count_star(),
        }
    }
}

/// The accumulated aggregate functions of a builder.
#[derive(Debug, Clone, Default)]
pub struct AggregateSpec<'r> {
    terms: Vec<(AggregateTerm<'r>, &'r str)>,
}

impl<'r> AggregateSpec<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn add_count(&mut self) {
        self.push(AggregateTerm::count(), "");
    }

    pub fn add_avg(&mut self, field: NumericField<'r>) {
        self.push_field(AggregateFunction::Avg, field.into());
    }

    pub fn add_sum(&mut self, field: NumericField<'r>) {
        self.push_field(AggregateFunction::Sum, field.into());
    }

    pub fn add_min(&mut self, field: ComparableField<'r>) {
        self.push_field(AggregateFunction::Min, field);
    }

    pub fn add_max(&mut self, field: ComparableField<'r>) {
        self.push_field(AggregateFunction::Max, field);
    }

    fn push_field(&mut self, function: AggregateFunction, field: ComparableField<'r>) {
        self.push(
            AggregateTerm {
                function,
                field: Some(field.field()),
            },
            field.model(),
        );
    }

    fn push(&mut self, term: AggregateTerm<'r>, model: &'r str) {
        if !self.terms.iter().any(|(t, _)| *t == term) {
            self.terms.push((term, model));
        }
    }

    /// The requested terms, checked against the model they are compiled for.
    pub fn terms(&self, model: &ModelMeta) -> Result<Vec<AggregateTerm<'r>>> {
        self.terms
            .iter()
            .map(|(term, owner)| {
                if term.field.is_some() && *owner != model.name() {
                    return Err(Error::Compile(CompileError::invalid_input(format!(
                        "aggregate field \"{}\" belongs to model \"{owner}\", not \"{}\"",
                        term.alias(),
                        model.name()
                    ))));
                }
                Ok(*term)
            })
            .collect()
    }
}

/// A name-based aggregate request, for association selections.
///
/// Resolved against the target model when the selection is planned; names
/// that are unknown or outside the function's surface are rejected then.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateRequest {
    pub count: bool,
    pub avg: Vec<String>,
    pub sum: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl AggregateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn avg(mut self, field: impl Into<String>) -> Self {
        self.avg.push(field.into());
        self
    }

    pub fn sum(mut self, field: impl Into<String>) -> Self {
        self.sum.push(field.into());
        self
    }

    pub fn min(mut self, field: impl Into<String>) -> Self {
        self.min.push(field.into());
        self
    }

    pub fn max(mut self, field: impl Into<String>) -> Self {
        self.max.push(field.into());
        self
    }

    pub fn resolve<'r>(&self, model: &'r ModelMeta) -> Result<AggregateSpec<'r>> {
        let mut spec = AggregateSpec::new();
        if self.count {
            spec.add_count();
        }
        let invalid = |name: &str| Error::Compile(CompileError::invalid_field_name(name));
        for name in &self.avg {
            spec.add_avg(model.numeric_field(name).ok_or_else(|| invalid(name))?);
        }
        for name in &self.sum {
            spec.add_sum(model.numeric_field(name).ok_or_else(|| invalid(name))?);
        }
        for name in &self.min {
            spec.add_min(model.comparable_field(name).ok_or_else(|| invalid(name))?);
        }
        for name in &self.max {
            spec.add_max(model.comparable_field(name).ok_or_else(|| invalid(name))?);
        }
        Ok(spec)
    }
}

/// Projection columns for `terms` over rows aliased `table`.
pub(crate) fn projection(terms: &[AggregateTerm<'_>], table: &str) -> Vec<SelectItem> {
    if terms.is_empty() {
        return vec![SelectItem::aliased(Expr::count_star(), "count")];
    }
    terms
        .iter()
        .map(|term| SelectItem::aliased(term.expr(table), term.alias()))
        .collect()
}

/// Shape one aggregate row as `{count, avg: {field: v}, sum, min, max}`,
/// holding only the requested functions.
pub(crate) fn decode(terms: &[AggregateTerm<'_>], row: Option<&Row>) -> Record {
    let mut record = Record::new();
    for term in terms {
        let raw = row.and_then(|r| r.get_by_name(&term.alias()));
        match term.field {
            None => {
                let count = raw.and_then(sqlmancer_core::Value::as_i64).unwrap_or(0);
                record.insert("count".to_string(), JsonValue::from(count));
            }
            Some(field) => {
                let value = match (raw, term.function) {
                    (None, _) => JsonValue::Null,
                    (Some(v), AggregateFunction::Avg | AggregateFunction::Sum) => {
                        decode_number(v)
                    }
                    (Some(v), _) => decode_field(field, v),
                };
                let group = record
                    .entry(term.function.name())
                    .or_insert_with(|| JsonValue::Object(Map::new()));
                if let JsonValue::Object(group) = group {
                    group.insert(field.name.clone(), value);
                }
            }
        }
    }
    record
}
