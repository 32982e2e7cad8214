//! SELECT statements.

use crate::clause::{OrderBy, limit_offset_sql};
use crate::expr::Expr;
use crate::join::Join;
use sqlmancer_core::{Dialect, Value};

/// One projected column.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// The FROM item of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    /// A table or CTE name
    Table { table: String, alias: String },
    /// A derived table
    Derived {
        query: Box<SelectQuery>,
        alias: String,
    },
}

impl FromItem {
    pub fn alias(&self) -> &str {
        match self {
            FromItem::Table { alias, .. } | FromItem::Derived { alias, .. } => alias,
        }
    }
}

/// A dialect-independent SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Columns to select (empty = all)
    pub columns: Vec<SelectItem>,
    pub from: FromItem,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    /// Create a query over a table (or CTE) under an alias.
    pub fn from_table(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::from_item(FromItem::Table {
            table: table.into(),
            alias: alias.into(),
        })
    }

    pub fn from_item(from: FromItem) -> Self {
        Self {
            columns: Vec::new(),
            from,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn column(mut self, item: SelectItem) -> Self {
        self.columns.push(item);
        self
    }

    /// Add a WHERE condition, AND-ed with any existing one.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Build the SQL with a specific dialect, appending bound values to
    /// `params`.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        let mut sql = String::from("SELECT ");

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<_> = self
                .columns
                .iter()
                .map(|item| {
                    let expr_sql = item.expr.build_with_dialect(dialect, params, offset);
                    match &item.alias {
                        Some(alias) => format!("{expr_sql} AS {}", dialect.quote_alias(alias)),
                        None => expr_sql,
                    }
                })
                .collect();
            sql.push_str(&cols.join(", "));
        }

        // FROM
        sql.push_str(" FROM ");
        match &self.from {
            FromItem::Table { table, alias } => {
                sql.push_str(&dialect.quote_identifier(table));
                sql.push_str(" AS ");
                sql.push_str(&dialect.quote_alias(alias));
            }
            FromItem::Derived { query, alias } => {
                sql.push('(');
                sql.push_str(&query.build_with_dialect(dialect, params, offset));
                sql.push_str(") AS ");
                sql.push_str(&dialect.quote_alias(alias));
            }
        }

        // JOINs
        for join in &self.joins {
            sql.push_str(&join.build_with_dialect(dialect, params, offset));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_with_dialect(dialect, params, offset));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            let groups: Vec<_> = self
                .group_by
                .iter()
                .map(|g| g.build_with_dialect(dialect, params, offset))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            let orders: Vec<_> = self
                .order_by
                .iter()
                .map(|o| o.build_with_dialect(dialect, params, offset))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        sql.push_str(&limit_offset_sql(dialect, self.limit, self.offset));

        sql
    }
}
