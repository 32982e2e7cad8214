//! JOIN clause types.

use crate::expr::Expr;
use sqlmancer_core::{Dialect, Value};

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Type of join
    pub join_type: JoinType,
    /// Table (or CTE) name
    pub table: String,
    /// Alias the joined rows are referenced by
    pub alias: String,
    /// ON condition
    pub on: Expr,
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Inner,
            table: table.into(),
            alias: alias.into(),
            on,
        }
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Left,
            table: table.into(),
            alias: alias.into(),
            on,
        }
    }

    /// Generate SQL for this JOIN, with a leading space.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        format!(
            " {} {} AS {} ON {}",
            self.join_type.as_str(),
            dialect.quote_identifier(&self.table),
            dialect.quote_alias(&self.alias),
            self.on.build_with_dialect(dialect, params, offset)
        )
    }
}

/// The joins of one query scope, de-duplicated by alias.
///
/// Aliases are derived from the association path, so asking twice for the
/// same path yields the same join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinSet {
    joins: Vec<Join>,
}

impl JoinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }

    /// Add a join unless one with the same alias is already present.
    pub fn add(&mut self, join: Join) {
        if !self.contains(&join.alias) {
            self.joins.push(join);
        }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Join> {
        self.joins.iter()
    }

    pub fn into_vec(self) -> Vec<Join> {
        self.joins
    }
}
