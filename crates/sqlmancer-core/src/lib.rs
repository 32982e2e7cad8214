//! Core types and traits for sqlmancer.
//!
//! This crate holds everything the statement compiler and the drivers agree
//! on:
//!
//! - `Registry` - the immutable model snapshot, folded from a `RegistryConfig`
//! - `Dialect` - per-database syntax differences
//! - `Operator` - the closed operator sets per field type and dialect
//! - `Executor` / `Connection` / `TransactionOps` - the driver boundary
//! - `Value` / `Row` - bound parameters and raw result rows
//! - `Outcome` and `Cx` re-exported from asupersync for cancel-correct execution

pub use asupersync::{Cx, Outcome};

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod field;
pub mod model;
pub mod operators;
pub mod registry;
pub mod relationship;
pub mod row;
pub mod types;
pub mod value;

pub use config::{FieldNameTransform, RegistryConfig};
pub use connection::{Connection, Executor, IsolationLevel, TransactionOps};
pub use dialect::{Dialect, IdStrategy};
pub use error::{
    CompileError, CompileErrorKind, ConfigError, Error, FieldValidationError, QueryError,
    QueryErrorKind, Result, ValidationError, ValidationErrorKind,
};
pub use field::FieldMeta;
pub use model::{ComparableField, InputAction, InputField, ModelMeta, ModelSource, NumericField};
pub use operators::Operator;
pub use registry::Registry;
pub use relationship::{Association, AssociationJoin, Cardinality, JoinPair};
pub use row::Row;
pub use types::{EnumMeta, FieldType, ScalarType};
pub use value::Value;
