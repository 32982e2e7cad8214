//! sqlmancer - compile nested filter, sort and aggregate expressions over a
//! model graph into dialect-correct SQL.
//!
//! A [`Registry`] describes models, their fields and the associations between
//! them. A [`Client`] binds a registry to a connection and hands out one
//! builder per operation:
//!
//! ```ignore
//! use sqlmancer::prelude::*;
//! use serde_json::json;
//!
//! let registry = Registry::from_json(include_str!("sakila.json"))?;
//! let client = Client::new(SqliteConnection::open_file("sakila.db")?, registry);
//! let films = client.model("Film")?;
//!
//! // Films in English with at least two actors, longest first
//! let rows = films
//!     .find_many()
//!     .where_(json!({
//!         "language": { "name": { "equal": "English" } },
//!         "actors": { "count": { "greaterThanOrEqual": 2 } }
//!     }))
//!     .order_by(json!([{ "length": "DESC" }]))
//!     .select(
//!         Selection::new()
//!             .fields(["title", "length"])
//!             .association("language", AssociationSelection::new(Selection::new().field("name")))
//!             .association("actors", AssociationSelection::new(Selection::new()).limit(3)),
//!     )
//!     .execute(&cx)
//!     .await;
//!
//! // Everything compiles without touching the database
//! let stmt = films.aggregate().count().build()?;
//! println!("{} {:?}", stmt.sql, stmt.params);
//! ```
//!
//! # Crates
//!
//! - `sqlmancer-core`: registry, dialects, operators, values and the
//!   executor traits
//! - `sqlmancer-query`: the compilers and builders
//! - `sqlmancer-sqlite`: an executor over bundled SQLite
//!
//! Every `execute` takes an asupersync `Cx` and returns an `Outcome`, so
//! cancellation and panics from the executor propagate unchanged.

mod client;

pub use client::{Client, ModelClient, ModelMutations};

pub use sqlmancer_core::{
    Association, CompileError, CompileErrorKind, ComparableField, ConfigError, Connection, Cx,
    Dialect, Error, Executor, FieldMeta, IdStrategy, IsolationLevel, ModelMeta, NumericField,
    Outcome, QueryError, Registry, RegistryConfig, Result, Row, TransactionOps, ValidationError,
    ValidationErrorKind, Value,
};
pub use sqlmancer_query::{
    Aggregate, AggregateFunction, AggregateRequest, AssociationArgs, AssociationSelection,
    CreateMany, CreateOne, DeleteById, DeleteMany, FindById, FindMany, FindOne, Page, Paginate,
    Record, Selection, Statement, UpdateById, UpdateMany,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlmancer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AggregateRequest, AssociationSelection, Client, Connection, Cx, Error, Executor,
        ModelClient, ModelMutations, Outcome, Page, Record, Registry, Result, Selection,
        Statement, TransactionOps, Value,
    };
}
