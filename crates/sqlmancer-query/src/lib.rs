//! Query compilation and the builder protocol for sqlmancer.
//!
//! `sqlmancer-query` turns JSON-shaped client arguments into SQL plus bound
//! parameters against a [`Registry`](sqlmancer_core::Registry) of model
//! metadata, and runs the result through any
//! [`Executor`](sqlmancer_core::Executor).
//!
//! # Role In The Architecture
//!
//! - **Compilers**: [`Filter`], [`OrderSpec`] and the aggregate terms compile
//!   `where`, `orderBy` and aggregate arguments over a model, joining or
//!   correlating associations as needed.
//! - **Selection**: [`Selection`] plans the projection; `one` associations are
//!   joined and flattened, associations that fan out are fetched by child
//!   queries after the parent rows.
//! - **Builders**: [`FindById`], [`FindMany`], [`Paginate`], [`Aggregate`] and
//!   the mutation builders compose the above into statements and execute
//!   them with structured cancellation through `asupersync`.
//!
//! Most users reach these builders through the `sqlmancer` facade crate.

pub mod aggregate;
pub mod builder;
pub mod clause;
mod compile;
pub mod expr;
pub mod filter;
mod input;
pub mod join;
pub mod order;
pub mod output;
pub mod select;
pub mod selection;
pub mod statement;

#[cfg(test)]
mod testing;

pub use aggregate::{AggregateFunction, AggregateRequest, AggregateSpec, AggregateTerm};
pub use builder::{
    Aggregate, CreateMany, CreateOne, DeleteById, DeleteMany, FindById, FindMany, FindOne, Page,
    Paginate, UpdateById, UpdateMany,
};
pub use clause::{OrderBy, OrderDirection};
pub use expr::Expr;
pub use filter::Filter;
pub use order::{OrderSpec, SortTerm};
pub use output::Record;
pub use selection::{AssociationArgs, AssociationSelection, Selection};
pub use statement::Statement;
