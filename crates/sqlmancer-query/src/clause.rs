//! SQL clause types (ORDER BY, LIMIT/OFFSET).

use crate::expr::Expr;
use sqlmancer_core::{CompileError, Dialect, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    /// Parse `ASC` / `DESC`, ignoring case.
    pub fn parse(value: &str) -> Result<Self, CompileError> {
        if value.eq_ignore_ascii_case("asc") {
            Ok(OrderDirection::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Ok(OrderDirection::Desc)
        } else {
            Err(CompileError::invalid_direction(value))
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn new(expr: Expr, direction: OrderDirection) -> Self {
        Self { expr, direction }
    }

    /// Generate SQL for this ORDER BY term.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        format!(
            "{} {}",
            self.expr.build_with_dialect(dialect, params, offset),
            self.direction.as_str()
        )
    }
}

/// LIMIT / OFFSET suffix, empty when neither is set.
///
/// A bare OFFSET is rendered with the dialect's "no limit" LIMIT where one is
/// required.
pub fn limit_offset_sql(dialect: Dialect, limit: Option<u64>, offset: Option<u64>) -> String {
    match (limit, offset) {
        (None, None) => String::new(),
        (Some(limit), None) => format!(" LIMIT {limit}"),
        (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        (None, Some(offset)) => match dialect.offset_only_limit() {
            Some(all) => format!(" LIMIT {all} OFFSET {offset}"),
            None => format!(" OFFSET {offset}"),
        },
    }
}
