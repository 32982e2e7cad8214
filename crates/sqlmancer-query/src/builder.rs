//! Builders for reads, pagination, aggregates and mutations.
//!
//! Every builder wraps the same [`QueryState`] plus whatever its operation
//! needs on top (an id, an input, an aggregate spec). Setters consume and
//! return the builder; `build()` compiles without running and `execute()`
//! compiles then runs against the bound executor.
//!
//! ```rust,ignore
//! let films = client
//!     .model("Film")?
//!     .find_many()
//!     .where_(json!({ "language": { "name": { "equal": "English" } } }))
//!     .order_by(json!([{ "title": "ASC" }]))
//!     .limit(10)
//!     .execute(&cx)
//!     .await;
//! ```
//!
//! `transaction(&tx)` rebinds a builder to another executor without touching
//! its state, so a caller-owned transaction can be threaded through any
//! number of builders.

use crate::aggregate::{self, AggregateSpec, AggregateTerm};
use crate::compile::Context;
use crate::expr::Expr;
use crate::filter::Filter;
use crate::input::{self, Assignment};
use crate::join::JoinSet;
use crate::order::OrderSpec;
use crate::output::{Record, decode_field};
use crate::select::{FromItem, SelectItem, SelectQuery};
use crate::selection::{ManyPlan, Selection, Shape};
use crate::statement::{Cte, Delete, Insert, Statement, Update};
use asupersync::{Cx, Outcome};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use sqlmancer_core::{
    Association, CompileError, ComparableField, Dialect, Error, Executor, IdStrategy, InputAction,
    ModelMeta, ModelSource, NumericField, Registry, Result, Row, Value,
};
use std::future::Future;
use std::pin::Pin;

macro_rules! try_outcome {
    ($e:expr) => {
        match $e {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

macro_rules! try_result {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e),
        }
    };
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub results: Vec<Record>,
    /// Requested aggregates over the whole filtered set; empty when none
    pub aggregate: Record,
    pub has_more: bool,
    pub total_count: u64,
}

impl Page {
    pub fn into_json(self) -> JsonValue {
        json!({
            "results": self.results.into_iter().map(JsonValue::Object).collect::<Vec<_>>(),
            "aggregate": JsonValue::Object(self.aggregate),
            "hasMore": self.has_more,
            "totalCount": self.total_count,
        })
    }
}

/// Restriction of a child query to the rows related to one parent.
#[derive(Debug, Clone)]
struct Scope<'a> {
    association: &'a Association,
    key: Value,
}

/// State shared by every builder.
#[derive(Debug, Clone)]
pub(crate) struct QueryState<'a> {
    registry: &'a Registry,
    model: &'a ModelMeta,
    filter: Option<JsonValue>,
    order_by: Option<JsonValue>,
    limit: Option<u64>,
    offset: Option<u64>,
    selection: Option<Selection>,
    id: Option<Value>,
    scope: Option<Scope<'a>>,
}

impl<'a> QueryState<'a> {
    fn new(registry: &'a Registry, model: &'a ModelMeta) -> Self {
        Self {
            registry,
            model,
            filter: None,
            order_by: None,
            limit: None,
            offset: None,
            selection: None,
            id: None,
            scope: None,
        }
    }

    fn for_association(registry: &'a Registry, plan: &ManyPlan<'a>, key: Value) -> Self {
        let args = &plan.selection.args;
        Self {
            filter: args.where_.clone(),
            order_by: args.order_by.clone(),
            limit: args.limit,
            offset: args.offset,
            selection: Some(plan.selection.selection.clone()),
            scope: Some(Scope {
                association: plan.association,
                key,
            }),
            ..Self::new(registry, plan.target)
        }
    }

    fn alias(&self) -> &'a str {
        self.model.name()
    }

    fn dialect(&self) -> Dialect {
        self.registry.dialect()
    }

    fn merge_where(&mut self, filter: JsonValue) {
        let current = self.filter.take().unwrap_or_else(|| json!({}));
        self.filter = Some(json!({ "and": [current, filter] }));
    }

    /// The base query with every row restriction applied.
    fn filtered(&self, ctx: &mut Context<'a>, joins: &mut JoinSet) -> Result<SelectQuery> {
        let alias = self.alias();
        let mut query = ctx.base_query(self.model);
        let mut terms = Vec::new();
        if let Some(id) = &self.id {
            terms.push(Expr::qualified(alias, self.model.primary_key()).eq(Expr::lit(id.clone())));
        }
        if let Some(scope) = &self.scope {
            terms.push(ctx.scope_predicate(alias, scope.association, scope.key.clone()));
        }
        if let Some(json) = &self.filter {
            let filter = Filter::parse(self.registry, self.model, json)?;
            terms.extend(ctx.compile_filter(joins, self.model, alias, &filter));
        }
        if let Some(predicate) = Expr::all(terms) {
            query = query.filter(predicate);
        }
        Ok(query)
    }

    fn ordered(&self, ctx: &mut Context<'a>, joins: &mut JoinSet, query: &mut SelectQuery) -> Result<()> {
        if let Some(json) = &self.order_by {
            let spec = OrderSpec::parse(self.registry, self.model, json)?;
            query.order_by = ctx.compile_order(joins, self.alias(), &spec);
        }
        Ok(())
    }

    fn finish(ctx: Context<'a>, joins: JoinSet, mut query: SelectQuery) -> Statement {
        let dialect = ctx.dialect;
        query.joins = joins.into_vec();
        Statement::select(dialect, &ctx.into_ctes(), &query)
    }

    fn select_statement(&self, limit: Option<u64>) -> Result<(Statement, Shape<'a>)> {
        let mut ctx = Context::new(self.registry);
        let mut joins = JoinSet::new();
        let mut columns = Vec::new();
        let default = Selection::default();
        let selection = self.selection.as_ref().unwrap_or(&default);
        let shape = ctx.plan_selection(&mut joins, self.model, self.alias(), selection, &mut columns)?;
        let mut query = self.filtered(&mut ctx, &mut joins)?;
        query.columns = columns;
        self.ordered(&mut ctx, &mut joins, &mut query)?;
        query.limit = limit;
        query.offset = self.offset;
        Ok((Self::finish(ctx, joins, query), shape))
    }

    fn count_statement(&self) -> Result<Statement> {
        let mut ctx = Context::new(self.registry);
        let mut joins = JoinSet::new();
        let query = self
            .filtered(&mut ctx, &mut joins)?
            .column(SelectItem::aliased(Expr::count_star(), "count"));
        Ok(Self::finish(ctx, joins, query))
    }

    /// Aggregate projection over the filtered rows. With `windowed`, a set
    /// limit or offset first narrows the rows in a derived table.
    fn aggregate_statement(&self, terms: &[AggregateTerm<'_>], windowed: bool) -> Result<Statement> {
        let mut ctx = Context::new(self.registry);
        let mut joins = JoinSet::new();
        let alias = self.alias();
        let mut query = self.filtered(&mut ctx, &mut joins)?;

        if windowed && (self.limit.is_some() || self.offset.is_some()) {
            self.ordered(&mut ctx, &mut joins, &mut query)?;
            query.columns = vec![SelectItem::new(Expr::raw(format!(
                "{}.*",
                ctx.dialect.quote_alias(alias)
            )))];
            query.limit = self.limit;
            query.offset = self.offset;
            query.joins = std::mem::take(&mut joins).into_vec();
            let mut outer = SelectQuery::from_item(FromItem::Derived {
                query: Box::new(query),
                alias: alias.to_string(),
            });
            outer.columns = aggregate::projection(terms, alias);
            return Ok(Self::finish(ctx, joins, outer));
        }

        query.columns = aggregate::projection(terms, alias);
        Ok(Self::finish(ctx, joins, query))
    }

    /// The table a mutation writes to.
    fn table(&self) -> Result<&'a str> {
        match self.model.source() {
            ModelSource::Table(table) if !self.model.is_read_only() => Ok(table),
            _ => Err(Error::Compile(CompileError::invalid_input(format!(
                "model {} is read-only",
                self.model.name()
            )))),
        }
    }

    /// `pk IN (SELECT k FROM (SELECT pk AS k ... WHERE ...) AS scope)`, the
    /// row restriction of a filtered mutation. `None` when unfiltered.
    fn mutation_scope(&self) -> Result<(Option<Expr>, Vec<Cte>)> {
        if self.filter.is_none() {
            return Ok((None, Vec::new()));
        }
        let mut ctx = Context::new(self.registry);
        let mut joins = JoinSet::new();
        let mut inner = self.filtered(&mut ctx, &mut joins)?;
        if inner.where_clause.is_none() {
            return Ok((None, Vec::new()));
        }
        let pk = self.model.primary_key();
        inner.columns = vec![SelectItem::aliased(Expr::qualified(self.alias(), pk), "k")];
        inner.joins = joins.into_vec();
        let outer = SelectQuery::from_item(FromItem::Derived {
            query: Box::new(inner),
            alias: "scope".to_string(),
        })
        .column(SelectItem::new(Expr::col("k")));
        Ok((Some(Expr::col(pk).in_subquery(outer)), ctx.into_ctes()))
    }

    fn assignments(&self, action: InputAction, input: &JsonValue) -> Result<Vec<Assignment<'a>>> {
        input::validate(self.model, self.dialect(), action, input)
    }

    fn insert_statements(&self, inputs: &[JsonValue]) -> Result<Vec<PlannedInsert>> {
        let table = self.table()?;
        let dialect = self.dialect();
        let pk = self.model.primary_key();
        let rows = inputs
            .iter()
            .map(|input| self.assignments(InputAction::Create, input))
            .collect::<Result<Vec<_>>>()?;
        let returning = (dialect.id_strategy() == IdStrategy::Returning).then(|| pk.to_string());

        let columns_of = |row: &[Assignment<'_>]| -> Vec<String> {
            row.iter().map(|(field, _)| field.column.clone()).collect()
        };
        let values_of = |row: &[Assignment<'_>]| -> Vec<Value> {
            row.iter().map(|(_, value)| value.clone()).collect()
        };
        let provided_of = |row: &[Assignment<'_>]| -> Option<JsonValue> {
            row.iter()
                .find(|(field, _)| field.column == pk)
                .map(|(field, value)| decode_field(field, value))
        };

        let uniform = rows.first().map(|first| columns_of(first)).filter(|columns| {
            !columns.is_empty() && rows.iter().all(|row| columns_of(row) == *columns)
        });
        let planned = match uniform {
            Some(columns) => vec![PlannedInsert {
                statement: Insert {
                    table: table.to_string(),
                    columns,
                    rows: rows.iter().map(|row| values_of(row)).collect(),
                    returning,
                }
                .build(dialect),
                provided: rows.iter().map(|row| provided_of(row)).collect(),
            }],
            None => rows
                .iter()
                .map(|row| PlannedInsert {
                    statement: Insert {
                        table: table.to_string(),
                        columns: columns_of(row),
                        rows: vec![values_of(row)],
                        returning: returning.clone(),
                    }
                    .build(dialect),
                    provided: vec![provided_of(row)],
                })
                .collect(),
        };
        Ok(planned)
    }
}

/// An INSERT plus the primary keys its rows supplied themselves.
#[derive(Debug, Clone)]
struct PlannedInsert {
    statement: Statement,
    provided: Vec<Option<JsonValue>>,
}

// ==================== Execution ====================

type BoxFuture<'f, T> = Pin<Box<dyn Future<Output = T> + Send + 'f>>;

fn log_statement(statement: &Statement) {
    tracing::debug!(sql = %statement.sql, params = statement.params.len(), "Executing statement");
}

fn to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

async fn fetch_records<E: Executor>(
    exec: &E,
    cx: &Cx,
    state: &QueryState<'_>,
    limit: Option<u64>,
) -> Outcome<Vec<Record>, Error> {
    let (statement, shape) = try_result!(state.select_statement(limit));
    log_statement(&statement);
    let rows = try_outcome!(exec.query(cx, &statement.sql, &statement.params).await);
    resolve_rows(exec, cx, state.registry, &shape, rows).await
}

async fn fetch_page<E: Executor>(
    exec: &E,
    cx: &Cx,
    state: &QueryState<'_>,
    aggregate: &AggregateSpec<'_>,
) -> Outcome<Page, Error> {
    let (data, shape) = try_result!(state.select_statement(state.limit.map(|l| l.saturating_add(1))));
    let count = try_result!(state.count_statement());
    let terms = try_result!(aggregate.terms(state.model));
    let aggregate_statement = if aggregate.is_empty() {
        None
    } else {
        Some(try_result!(state.aggregate_statement(&terms, false)))
    };

    log_statement(&data);
    let mut rows = try_outcome!(exec.query(cx, &data.sql, &data.params).await);
    if let Some(limit) = state.limit {
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    let results = try_outcome!(resolve_rows(exec, cx, state.registry, &shape, rows).await);

    log_statement(&count);
    let count_row = try_outcome!(exec.query_one(cx, &count.sql, &count.params).await);
    let total_count = count_row
        .as_ref()
        .and_then(|row| row.get_by_name("count"))
        .and_then(Value::as_i64)
        .map_or(0, |n| u64::try_from(n).unwrap_or(0));

    let aggregate = match aggregate_statement {
        Some(statement) => {
            log_statement(&statement);
            let row = try_outcome!(exec.query_one(cx, &statement.sql, &statement.params).await);
            aggregate::decode(&terms, row.as_ref())
        }
        None => Record::new(),
    };

    let has_more = state.offset.unwrap_or(0).saturating_add(to_u64(results.len())) < total_count;
    tracing::debug!(returned = results.len(), total_count, has_more, "Fetched page");
    Outcome::Ok(Page {
        results,
        aggregate,
        has_more,
        total_count,
    })
}

async fn resolve_rows<E: Executor>(
    exec: &E,
    cx: &Cx,
    registry: &Registry,
    shape: &Shape<'_>,
    rows: Vec<Row>,
) -> Outcome<Vec<Record>, Error> {
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut record = shape.decode_root(row);
        if shape.has_deferred() {
            try_outcome!(attach(exec, cx, registry, shape, row, &mut record).await);
        }
        records.push(record);
    }
    Outcome::Ok(records)
}

/// Resolve the deferred associations of one decoded row, at this level and
/// under every joined association.
fn attach<'f, E: Executor>(
    exec: &'f E,
    cx: &'f Cx,
    registry: &'f Registry,
    shape: &'f Shape<'f>,
    row: &'f Row,
    record: &'f mut Record,
) -> BoxFuture<'f, Outcome<(), Error>> {
    Box::pin(async move {
        for plan in &shape.manys {
            let key = row.get_by_name(&plan.key_column).cloned().unwrap_or(Value::Null);
            let value = try_outcome!(resolve_many(exec, cx, registry, plan, key).await);
            record.insert(plan.association.name.clone(), value);
        }
        for (association, nested) in &shape.ones {
            if !nested.has_deferred() {
                continue;
            }
            if let Some(JsonValue::Object(child)) = record.get_mut(&association.name) {
                try_outcome!(attach(exec, cx, registry, nested, row, child).await);
            }
        }
        Outcome::Ok(())
    })
}

async fn resolve_many<E: Executor>(
    exec: &E,
    cx: &Cx,
    registry: &Registry,
    plan: &ManyPlan<'_>,
    key: Value,
) -> Outcome<JsonValue, Error> {
    let paginated = plan.association.paginated;
    if key.is_null() {
        return Outcome::Ok(if paginated {
            Page::default().into_json()
        } else {
            JsonValue::Array(Vec::new())
        });
    }
    tracing::trace!(association = %plan.association.name, "Resolving deferred association");
    let state = QueryState::for_association(registry, plan, key);
    if paginated {
        let spec = match &plan.selection.args.aggregate {
            Some(request) => try_result!(request.resolve(plan.target)),
            None => AggregateSpec::new(),
        };
        let page = try_outcome!(fetch_page(exec, cx, &state, &spec).await);
        Outcome::Ok(page.into_json())
    } else {
        let records = try_outcome!(fetch_records(exec, cx, &state, state.limit).await);
        Outcome::Ok(JsonValue::Array(records.into_iter().map(JsonValue::Object).collect()))
    }
}

async fn run_inserts<E: Executor>(
    exec: &E,
    cx: &Cx,
    state: &QueryState<'_>,
    planned: &[PlannedInsert],
) -> Outcome<Vec<JsonValue>, Error> {
    let pk = state.model.pk();
    let mut keys = Vec::new();
    for insert in planned {
        let statement = &insert.statement;
        log_statement(statement);
        match state.dialect().id_strategy() {
            IdStrategy::Returning => {
                let rows = try_outcome!(exec.query(cx, &statement.sql, &statement.params).await);
                keys.extend(
                    rows.iter()
                        .map(|row| row.get(0).map_or(JsonValue::Null, |v| decode_field(pk, v))),
                );
            }
            IdStrategy::LastInsertId => {
                let first = try_outcome!(exec.insert(cx, &statement.sql, &statement.params).await);
                keys.extend(
                    insert
                        .provided
                        .iter()
                        .zip(0_i64..)
                        .map(|(provided, i)| {
                            provided.clone().unwrap_or_else(|| JsonValue::from(first + i))
                        }),
                );
            }
        }
    }
    Outcome::Ok(keys)
}

// ==================== Setters ====================

macro_rules! filter_setters {
    () => {
        /// Replace the filter.
        pub fn where_(mut self, filter: JsonValue) -> Self {
            self.state.filter = Some(filter);
            self
        }

        /// Combine `filter` with the current filter as `{and: [current, filter]}`.
        pub fn merge_where(mut self, filter: JsonValue) -> Self {
            self.state.merge_where(filter);
            self
        }
    };
}

macro_rules! window_setters {
    () => {
        pub fn order_by(mut self, order: JsonValue) -> Self {
            self.state.order_by = Some(order);
            self
        }

        pub fn limit(mut self, limit: u64) -> Self {
            self.state.limit = Some(limit);
            self
        }

        pub fn offset(mut self, offset: u64) -> Self {
            self.state.offset = Some(offset);
            self
        }
    };
}

macro_rules! select_setter {
    () => {
        pub fn select(mut self, selection: Selection) -> Self {
            self.state.selection = Some(selection);
            self
        }
    };
}

macro_rules! aggregate_setters {
    () => {
        pub fn count(mut self) -> Self {
            self.aggregate.add_count();
            self
        }

        pub fn avg(mut self, field: NumericField<'a>) -> Self {
            self.aggregate.add_avg(field);
            self
        }

        pub fn sum(mut self, field: NumericField<'a>) -> Self {
            self.aggregate.add_sum(field);
            self
        }

        pub fn min(mut self, field: ComparableField<'a>) -> Self {
            self.aggregate.add_min(field);
            self
        }

        pub fn max(mut self, field: ComparableField<'a>) -> Self {
            self.aggregate.add_max(field);
            self
        }
    };
}

macro_rules! transaction_setter {
    ($builder:ident { $($field:ident),* }) => {
        /// Run this builder against a caller-owned transaction instead.
        pub fn transaction<'t, T: Executor>(self, tx: &'t T) -> $builder<'t, T>
        where
            'a: 't,
        {
            $builder {
                exec: tx,
                state: self.state,
                $($field: self.$field,)*
            }
        }
    };
}

// ==================== Reads ====================

/// Fetch one record by primary key.
#[derive(Debug)]
pub struct FindById<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
}

impl<'a, E: Executor> FindById<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta, id: impl Into<Value>) -> Self {
        let mut state = QueryState::new(registry, model);
        state.id = Some(id.into());
        Self { exec, state }
    }

    select_setter!();
    transaction_setter!(FindById {});

    pub fn build(&self) -> Result<Statement> {
        self.state.select_statement(None).map(|(statement, _)| statement)
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<Option<Record>, Error> {
        fetch_records(self.exec, cx, &self.state, None)
            .await
            .map(|records| records.into_iter().next())
    }
}

/// Fetch the first matching record.
#[derive(Debug)]
pub struct FindOne<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
}

impl<'a, E: Executor> FindOne<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
        }
    }

    filter_setters!();
    select_setter!();
    transaction_setter!(FindOne {});

    pub fn order_by(mut self, order: JsonValue) -> Self {
        self.state.order_by = Some(order);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.state.offset = Some(offset);
        self
    }

    pub fn build(&self) -> Result<Statement> {
        self.state.select_statement(Some(1)).map(|(statement, _)| statement)
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<Option<Record>, Error> {
        fetch_records(self.exec, cx, &self.state, Some(1))
            .await
            .map(|records| records.into_iter().next())
    }
}

/// Fetch every matching record.
#[derive(Debug)]
pub struct FindMany<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
}

impl<'a, E: Executor> FindMany<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
        }
    }

    filter_setters!();
    window_setters!();
    select_setter!();
    transaction_setter!(FindMany {});

    pub fn build(&self) -> Result<Statement> {
        self.state
            .select_statement(self.state.limit)
            .map(|(statement, _)| statement)
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<Vec<Record>, Error> {
        fetch_records(self.exec, cx, &self.state, self.state.limit).await
    }
}

/// Fetch one page of matching records with the total count.
#[derive(Debug)]
pub struct Paginate<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
    aggregate: AggregateSpec<'a>,
}

impl<'a, E: Executor> Paginate<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
            aggregate: AggregateSpec::new(),
        }
    }

    filter_setters!();
    window_setters!();
    select_setter!();
    aggregate_setters!();
    transaction_setter!(Paginate { aggregate });

    /// The data, count and (when requested) aggregate statements, in
    /// execution order.
    pub fn build(&self) -> Result<Vec<Statement>> {
        let (data, _) = self
            .state
            .select_statement(self.state.limit.map(|l| l.saturating_add(1)))?;
        let mut statements = vec![data, self.state.count_statement()?];
        if !self.aggregate.is_empty() {
            let terms = self.aggregate.terms(self.state.model)?;
            statements.push(self.state.aggregate_statement(&terms, false)?);
        }
        Ok(statements)
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<Page, Error> {
        fetch_page(self.exec, cx, &self.state, &self.aggregate).await
    }
}

/// Compute aggregates over the matching records.
#[derive(Debug)]
pub struct Aggregate<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
    aggregate: AggregateSpec<'a>,
}

impl<'a, E: Executor> Aggregate<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
            aggregate: AggregateSpec::new(),
        }
    }

    filter_setters!();
    window_setters!();
    aggregate_setters!();
    transaction_setter!(Aggregate { aggregate });

    pub fn build(&self) -> Result<Statement> {
        let terms = self.aggregate.terms(self.state.model)?;
        self.state.aggregate_statement(&terms, true)
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<Record, Error> {
        let terms = try_result!(self.aggregate.terms(self.state.model));
        let statement = try_result!(self.state.aggregate_statement(&terms, true));
        log_statement(&statement);
        let row = try_outcome!(
            self.exec
                .query_one(cx, &statement.sql, &statement.params)
                .await
        );
        Outcome::Ok(aggregate::decode(&terms, row.as_ref()))
    }
}

// ==================== Mutations ====================

/// Insert one record, returning its primary key.
#[derive(Debug)]
pub struct CreateOne<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
    input: JsonValue,
}

impl<'a, E: Executor> CreateOne<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta, input: JsonValue) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
            input,
        }
    }

    transaction_setter!(CreateOne { input });

    pub fn build(&self) -> Result<Statement> {
        let mut planned = self.state.insert_statements(std::slice::from_ref(&self.input))?;
        planned
            .pop()
            .map(|insert| insert.statement)
            .ok_or_else(|| Error::Custom("no statement planned for insert".to_string()))
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<JsonValue, Error> {
        let planned = try_result!(self.state.insert_statements(std::slice::from_ref(&self.input)));
        run_inserts(self.exec, cx, &self.state, &planned)
            .await
            .map(|keys| keys.into_iter().next().unwrap_or(JsonValue::Null))
    }
}

/// Insert several records, returning their primary keys in input order.
#[derive(Debug)]
pub struct CreateMany<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
    inputs: Vec<JsonValue>,
}

impl<'a, E: Executor> CreateMany<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta, inputs: Vec<JsonValue>) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
            inputs,
        }
    }

    transaction_setter!(CreateMany { inputs });

    /// One multi-row INSERT when every input supplies the same fields,
    /// otherwise one INSERT per input.
    pub fn build(&self) -> Result<Vec<Statement>> {
        Ok(self
            .state
            .insert_statements(&self.inputs)?
            .into_iter()
            .map(|insert| insert.statement)
            .collect())
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name(), rows = self.inputs.len()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<Vec<JsonValue>, Error> {
        let planned = try_result!(self.state.insert_statements(&self.inputs));
        run_inserts(self.exec, cx, &self.state, &planned).await
    }
}

/// Update one record by primary key.
#[derive(Debug)]
pub struct UpdateById<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
    id: Value,
    input: JsonValue,
}

impl<'a, E: Executor> UpdateById<'a, E> {
    pub fn new(
        exec: &'a E,
        registry: &'a Registry,
        model: &'a ModelMeta,
        id: impl Into<Value>,
        input: JsonValue,
    ) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
            id: id.into(),
            input,
        }
    }

    transaction_setter!(UpdateById { id, input });

    /// `None` when the input sets nothing.
    pub fn build(&self) -> Result<Option<Statement>> {
        let table = self.state.table()?;
        let set = self.state.assignments(InputAction::Update, &self.input)?;
        if set.is_empty() {
            return Ok(None);
        }
        let pk = self.state.model.primary_key();
        Ok(Some(
            Update {
                table: table.to_string(),
                set: set.into_iter().map(|(field, value)| (field.column.clone(), value)).collect(),
                where_clause: Some(Expr::col(pk).eq(Expr::lit(self.id.clone()))),
            }
            .build(self.state.dialect()),
        ))
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<(), Error> {
        let Some(statement) = try_result!(self.build()) else {
            tracing::trace!("Empty update input, nothing to do");
            return Outcome::Ok(());
        };
        log_statement(&statement);
        self.exec
            .execute(cx, &statement.sql, &statement.params)
            .await
            .map(|_| ())
    }
}

/// Update every matching record.
#[derive(Debug)]
pub struct UpdateMany<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
    input: JsonValue,
}

impl<'a, E: Executor> UpdateMany<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta, input: JsonValue) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
            input,
        }
    }

    filter_setters!();
    transaction_setter!(UpdateMany { input });

    /// `None` when the input sets nothing.
    pub fn build(&self) -> Result<Option<Statement>> {
        let table = self.state.table()?;
        let set = self.state.assignments(InputAction::Update, &self.input)?;
        if set.is_empty() {
            return Ok(None);
        }
        let dialect = self.state.dialect();
        let (where_clause, ctes) = self.state.mutation_scope()?;
        Ok(Some(
            Update {
                table: table.to_string(),
                set: set.into_iter().map(|(field, value)| (field.column.clone(), value)).collect(),
                where_clause,
            }
            .build(dialect)
            .with_ctes(dialect, &ctes),
        ))
    }

    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<u64, Error> {
        let Some(statement) = try_result!(self.build()) else {
            tracing::trace!("Empty update input, nothing to do");
            return Outcome::Ok(0);
        };
        log_statement(&statement);
        self.exec.execute(cx, &statement.sql, &statement.params).await
    }
}

/// Delete one record by primary key.
#[derive(Debug)]
pub struct DeleteById<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
    id: Value,
}

impl<'a, E: Executor> DeleteById<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta, id: impl Into<Value>) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
            id: id.into(),
        }
    }

    transaction_setter!(DeleteById { id });

    pub fn build(&self) -> Result<Statement> {
        let table = self.state.table()?;
        let pk = self.state.model.primary_key();
        Ok(Delete {
            table: table.to_string(),
            where_clause: Some(Expr::col(pk).eq(Expr::lit(self.id.clone()))),
        }
        .build(self.state.dialect()))
    }

    /// Whether a record was deleted.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<bool, Error> {
        let statement = try_result!(self.build());
        log_statement(&statement);
        self.exec
            .execute(cx, &statement.sql, &statement.params)
            .await
            .map(|affected| affected > 0)
    }
}

/// Delete every matching record.
#[derive(Debug)]
pub struct DeleteMany<'a, E> {
    exec: &'a E,
    state: QueryState<'a>,
}

impl<'a, E: Executor> DeleteMany<'a, E> {
    pub fn new(exec: &'a E, registry: &'a Registry, model: &'a ModelMeta) -> Self {
        Self {
            exec,
            state: QueryState::new(registry, model),
        }
    }

    filter_setters!();
    transaction_setter!(DeleteMany {});

    pub fn build(&self) -> Result<Statement> {
        let table = self.state.table()?;
        let dialect = self.state.dialect();
        let (where_clause, ctes) = self.state.mutation_scope()?;
        Ok(Delete {
            table: table.to_string(),
            where_clause,
        }
        .build(dialect)
        .with_ctes(dialect, &ctes))
    }

    /// Whether any record was deleted.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.state.model.name()))]
    pub async fn execute(&self, cx: &Cx) -> Outcome<bool, Error> {
        let statement = try_result!(self.build());
        log_statement(&statement);
        self.exec
            .execute(cx, &statement.sql, &statement.params)
            .await
            .map(|affected| affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sakila, sakila_for};
    use sqlmancer_core::Row;

    /// Executor that only exists to satisfy builder type parameters.
    struct NoopExecutor;

    impl Executor for NoopExecutor {
        fn query(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            async { Outcome::Ok(Vec::new()) }
        }

        fn execute(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            async { Outcome::Ok(0) }
        }

        fn insert(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<i64, Error>> + Send {
            async { Outcome::Ok(0) }
        }
    }

    fn film(registry: &Registry) -> &ModelMeta {
        registry.model("Film").unwrap()
    }

    #[test]
    fn test_find_many_full_statement() {
        let registry = sakila();
        let stmt = FindMany::new(&NoopExecutor, &registry, film(&registry))
            .where_(json!({ "length": { "greaterThan": 100 } }))
            .order_by(json!([{ "title": "ASC" }]))
            .limit(10)
            .offset(20)
            .select(Selection::new().field("title"))
            .build()
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"Film\".\"film_id\" AS \"id\", \"Film\".\"title\" AS \"title\" FROM \"film\" AS \"Film\" \
             WHERE \"Film\".\"length\" > ?1 ORDER BY \"Film\".\"title\" ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(stmt.params, vec![Value::BigInt(100)]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let registry = sakila();
        let builder = FindMany::new(&NoopExecutor, &registry, film(&registry))
            .where_(json!({ "language": { "name": { "equal": "English" } } }));
        assert_eq!(builder.build().unwrap(), builder.build().unwrap());
    }

    #[test]
    fn test_merge_where_matches_explicit_and() {
        let registry = sakila();
        let f = json!({ "title": { "like": "A%" } });
        let g = json!({ "length": { "lessThan": 90 } });
        let merged = FindMany::new(&NoopExecutor, &registry, film(&registry))
            .where_(f.clone())
            .merge_where(g.clone())
            .build()
            .unwrap();
        let explicit = FindMany::new(&NoopExecutor, &registry, film(&registry))
            .where_(json!({ "and": [f, g] }))
            .build()
            .unwrap();
        assert_eq!(merged, explicit);
    }

    #[test]
    fn test_find_by_id_and_find_one() {
        let registry = sakila();
        let stmt = FindById::new(&NoopExecutor, &registry, film(&registry), 7_i64)
            .select(Selection::new().field("title"))
            .build()
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"Film\".\"film_id\" AS \"id\", \"Film\".\"title\" AS \"title\" FROM \"film\" AS \"Film\" \
             WHERE \"Film\".\"film_id\" = ?1"
        );
        assert_eq!(stmt.params, vec![Value::BigInt(7)]);

        let stmt = FindOne::new(&NoopExecutor, &registry, film(&registry))
            .select(Selection::new().field("title"))
            .build()
            .unwrap();
        assert!(stmt.sql.ends_with(" LIMIT 1"), "{}", stmt.sql);
    }

    #[test]
    fn test_paginate_statements() {
        let registry = sakila();
        let film = film(&registry);
        let statements = Paginate::new(&NoopExecutor, &registry, film)
            .where_(json!({ "rating": { "equal": "PG13" } }))
            .limit(5)
            .offset(10)
            .select(Selection::new().field("title"))
            .avg(film.numeric_field("length").unwrap())
            .build()
            .unwrap();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].sql.ends_with(" LIMIT 6 OFFSET 10"), "{}", statements[0].sql);
        assert_eq!(
            statements[1].sql,
            "SELECT COUNT(*) AS \"count\" FROM \"film\" AS \"Film\" WHERE \"Film\".\"rating\" = ?1"
        );
        assert_eq!(statements[1].params, vec![Value::from("PG-13")]);
        assert_eq!(
            statements[2].sql,
            "SELECT AVG(\"Film\".\"length\") AS \"avg__length\" FROM \"film\" AS \"Film\" WHERE \"Film\".\"rating\" = ?1"
        );
    }

    #[test]
    fn test_aggregate_with_single_join() {
        let registry = sakila();
        let film = film(&registry);
        let stmt = Aggregate::new(&NoopExecutor, &registry, film)
            .sum(film.numeric_field("rentalRate").unwrap())
            .where_(json!({ "language": { "name": { "equal": "English" } } }))
            .build()
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT SUM(\"Film\".\"rental_rate\") AS \"sum__rentalRate\" FROM \"film\" AS \"Film\" \
             LEFT JOIN \"language\" AS \"Film__language\" ON \"Film__language\".\"language_id\" = \"Film\".\"language_id\" \
             WHERE \"Film__language\".\"name\" = ?1"
        );
        assert_eq!(stmt.sql.matches("JOIN \"language\"").count(), 1);
    }

    #[test]
    fn test_aggregate_windowed() {
        let registry = sakila();
        let stmt = Aggregate::new(&NoopExecutor, &registry, film(&registry))
            .count()
            .order_by(json!([{ "length": "DESC" }]))
            .limit(3)
            .build()
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS \"count\" FROM (SELECT \"Film\".* FROM \"film\" AS \"Film\" \
             ORDER BY \"Film\".\"length\" DESC LIMIT 3) AS \"Film\""
        );
    }

    #[test]
    fn test_create_many_batches_uniform_rows() {
        let registry = sakila();
        let actor = registry.model("Actor").unwrap();
        let statements = CreateMany::new(
            &NoopExecutor,
            &registry,
            actor,
            vec![
                json!({ "firstName": "A", "lastName": "B" }),
                json!({ "firstName": "C", "lastName": "D" }),
            ],
        )
        .build()
        .unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "INSERT INTO \"actor\" (\"first_name\", \"last_name\") VALUES (?1, ?2), (?3, ?4) RETURNING \"actor_id\""
        );

        let statements = CreateMany::new(
            &NoopExecutor,
            &registry,
            actor,
            vec![
                json!({ "firstName": "A", "lastName": "B" }),
                json!({ "id": 99, "firstName": "C", "lastName": "D" }),
            ],
        )
        .build()
        .unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_mysql_create_has_no_returning() {
        let registry = sakila_for(Dialect::Mysql);
        let actor = registry.model("Actor").unwrap();
        let stmt = CreateOne::new(&NoopExecutor, &registry, actor, json!({ "firstName": "A", "lastName": "B" }))
            .build()
            .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO `actor` (`first_name`, `last_name`) VALUES (?, ?)");
    }

    /// Executor whose every `insert` reports `first_id` and records the
    /// statement it was given.
    struct LastIdExecutor {
        first_id: i64,
        inserts: std::sync::Mutex<Vec<(String, usize)>>,
    }

    impl LastIdExecutor {
        fn new(first_id: i64) -> Self {
            Self {
                first_id,
                inserts: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn inserts(&self) -> Vec<(String, usize)> {
            self.inserts.lock().unwrap().clone()
        }
    }

    impl Executor for LastIdExecutor {
        fn query(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            async { Outcome::Ok(Vec::new()) }
        }

        fn execute(
            &self,
            _cx: &Cx,
            _sql: &str,
            _params: &[Value],
        ) -> impl Future<Output = Outcome<u64, Error>> + Send {
            async { Outcome::Ok(0) }
        }

        fn insert(
            &self,
            _cx: &Cx,
            sql: &str,
            params: &[Value],
        ) -> impl Future<Output = Outcome<i64, Error>> + Send {
            self.inserts.lock().unwrap().push((sql.to_string(), params.len()));
            let id = self.first_id;
            async move { Outcome::Ok(id) }
        }
    }

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    #[test]
    fn test_mysql_keys_follow_last_insert_id() {
        let rt = asupersync::runtime::RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let registry = sakila_for(Dialect::Mysql);
        let actor = registry.model("Actor").unwrap();

        rt.block_on(async {
            let exec = LastIdExecutor::new(10);
            let keys = unwrap_outcome(
                CreateMany::new(
                    &exec,
                    &registry,
                    actor,
                    vec![
                        json!({ "firstName": "PENELOPE", "lastName": "GUINESS" }),
                        json!({ "firstName": "NICK", "lastName": "WAHLBERG" }),
                        json!({ "firstName": "ED", "lastName": "CHASE" }),
                    ],
                )
                .execute(&cx)
                .await,
            );
            assert_eq!(keys, vec![json!(10), json!(11), json!(12)]);
            assert_eq!(
                exec.inserts(),
                vec![(
                    "INSERT INTO `actor` (`first_name`, `last_name`) VALUES (?, ?), (?, ?), (?, ?)"
                        .to_string(),
                    6
                )]
            );

            let exec = LastIdExecutor::new(10);
            let key = unwrap_outcome(
                CreateOne::new(&exec, &registry, actor, json!({ "firstName": "JOE", "lastName": "SWANK" }))
                    .execute(&cx)
                    .await,
            );
            assert_eq!(key, json!(10));

            // a supplied key is reported as given; the other row has its own insert
            let exec = LastIdExecutor::new(10);
            let keys = unwrap_outcome(
                CreateMany::new(
                    &exec,
                    &registry,
                    actor,
                    vec![
                        json!({ "id": 50, "firstName": "UMA", "lastName": "WOOD" }),
                        json!({ "firstName": "ZERO", "lastName": "CAGE" }),
                    ],
                )
                .execute(&cx)
                .await,
            );
            assert_eq!(keys, vec![json!(50), json!(10)]);
            assert_eq!(exec.inserts().len(), 2);

            let exec = LastIdExecutor::new(10);
            let keys = unwrap_outcome(
                CreateMany::new(
                    &exec,
                    &registry,
                    actor,
                    vec![
                        json!({ "id": 7, "firstName": "GRACE", "lastName": "MOSTEL" }),
                        json!({ "id": 8, "firstName": "MATTHEW", "lastName": "JOHANSSON" }),
                    ],
                )
                .execute(&cx)
                .await,
            );
            assert_eq!(keys, vec![json!(7), json!(8)]);
        });
    }

    #[test]
    fn test_create_validation_error() {
        let registry = sakila();
        let err = CreateOne::new(&NoopExecutor, &registry, film(&registry), json!({ "bogus": 1 }))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_update_many_scope() {
        let registry = sakila();
        let stmt = UpdateMany::new(&NoopExecutor, &registry, film(&registry), json!({ "length": 100 }))
            .where_(json!({ "language": { "name": { "equal": "English" } } }))
            .build()
            .unwrap()
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"film\" SET \"length\" = ?1 WHERE \"film_id\" IN (SELECT \"k\" FROM \
             (SELECT \"Film\".\"film_id\" AS \"k\" FROM \"film\" AS \"Film\" \
             LEFT JOIN \"language\" AS \"Film__language\" ON \"Film__language\".\"language_id\" = \"Film\".\"language_id\" \
             WHERE \"Film__language\".\"name\" = ?2) AS \"scope\")"
        );
        assert_eq!(stmt.params, vec![Value::BigInt(100), Value::from("English")]);

        let stmt = UpdateMany::new(&NoopExecutor, &registry, film(&registry), json!({ "length": 100 }))
            .build()
            .unwrap()
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE \"film\" SET \"length\" = ?1");
    }

    #[test]
    fn test_empty_update_is_noop() {
        let registry = sakila();
        let built = UpdateById::new(&NoopExecutor, &registry, film(&registry), 1_i64, json!({}))
            .build()
            .unwrap();
        assert!(built.is_none());
        let built = UpdateMany::new(&NoopExecutor, &registry, film(&registry), json!({}))
            .build()
            .unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn test_delete_statements() {
        let registry = sakila();
        let stmt = DeleteById::new(&NoopExecutor, &registry, film(&registry), 3_i64)
            .build()
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"film\" WHERE \"film_id\" = ?1");

        let stmt = DeleteMany::new(&NoopExecutor, &registry, film(&registry))
            .where_(json!({ "title": { "equal": "X" } }))
            .build()
            .unwrap();
        assert!(stmt.sql.starts_with("DELETE FROM \"film\" WHERE \"film_id\" IN (SELECT \"k\" FROM"), "{}", stmt.sql);
    }

    #[test]
    fn test_read_only_models_reject_mutations() {
        let registry = sakila();
        let category = registry.model("Category").unwrap();
        let err = DeleteById::new(&NoopExecutor, &registry, category, 1_i64)
            .build()
            .unwrap_err();
        assert!(err.is_compile_error());
    }

    #[test]
    fn test_page_json_shape() {
        let page = Page {
            results: vec![Record::new()],
            aggregate: Record::new(),
            has_more: true,
            total_count: 4,
        };
        assert_eq!(
            page.into_json(),
            json!({ "results": [{}], "aggregate": {}, "hasMore": true, "totalCount": 4 })
        );
    }
}
