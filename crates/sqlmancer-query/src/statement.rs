//! Compiled statements and the DML shapes the mutation builders emit.

use crate::expr::Expr;
use crate::select::SelectQuery;
use sqlmancer_core::{Dialect, Value};

/// A compiled statement: SQL text plus its bindings in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// A common table expression hoisted to the top of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cte {
    pub name: String,
    pub sql: String,
}

impl Statement {
    /// Render a SELECT, prefixed by a WITH clause when CTE models are involved.
    pub fn select(dialect: Dialect, ctes: &[Cte], query: &SelectQuery) -> Self {
        let mut params = Vec::new();
        let body = query.build_with_dialect(dialect, &mut params, 0);
        Self {
            sql: format!("{}{body}", with_clause(dialect, ctes)),
            params,
        }
    }

    /// Prefix a DML statement with the WITH clause its scope needs.
    pub fn with_ctes(mut self, dialect: Dialect, ctes: &[Cte]) -> Self {
        self.sql = format!("{}{}", with_clause(dialect, ctes), self.sql);
        self
    }
}

fn with_clause(dialect: Dialect, ctes: &[Cte]) -> String {
    if ctes.is_empty() {
        return String::new();
    }
    let defs: Vec<_> = ctes
        .iter()
        .map(|cte| format!("{} AS ({})", dialect.quote_alias(&cte.name), cte.sql))
        .collect();
    format!("WITH {} ", defs.join(", "))
}

/// `INSERT INTO table (cols) VALUES (...), (...) [RETURNING pk]`
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    /// One entry per row, each the same length as `columns`
    pub rows: Vec<Vec<Value>>,
    pub returning: Option<String>,
}

impl Insert {
    pub fn build(&self, dialect: Dialect) -> Statement {
        let mut params = Vec::new();
        let table = dialect.quote_identifier(&self.table);
        let mut sql = if self.columns.is_empty() {
            match dialect {
                Dialect::Mysql | Dialect::Mariadb => format!("INSERT INTO {table} () VALUES ()"),
                Dialect::Postgres | Dialect::Sqlite => {
                    format!("INSERT INTO {table} DEFAULT VALUES")
                }
            }
        } else {
            let columns: Vec<_> = self
                .columns
                .iter()
                .map(|c| dialect.quote_alias(c))
                .collect();
            let rows: Vec<_> = self
                .rows
                .iter()
                .map(|row| {
                    let placeholders: Vec<_> = row
                        .iter()
                        .map(|value| {
                            params.push(value.clone());
                            dialect.placeholder(params.len())
                        })
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();
            format!(
                "INSERT INTO {table} ({}) VALUES {}",
                columns.join(", "),
                rows.join(", ")
            )
        };
        if let Some(pk) = &self.returning {
            sql.push_str(" RETURNING ");
            sql.push_str(&dialect.quote_alias(pk));
        }
        Statement { sql, params }
    }
}

/// `UPDATE table SET col = ?, ... [WHERE ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub set: Vec<(String, Value)>,
    pub where_clause: Option<Expr>,
}

impl Update {
    pub fn build(&self, dialect: Dialect) -> Statement {
        let mut params = Vec::new();
        let assignments: Vec<_> = self
            .set
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!(
                    "{} = {}",
                    dialect.quote_alias(column),
                    dialect.placeholder(params.len())
                )
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(&self.table),
            assignments.join(", ")
        );
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_with_dialect(dialect, &mut params, 0));
        }
        Statement { sql, params }
    }
}

/// `DELETE FROM table [WHERE ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub where_clause: Option<Expr>,
}

impl Delete {
    pub fn build(&self, dialect: Dialect) -> Statement {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", dialect.quote_identifier(&self.table));
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_with_dialect(dialect, &mut params, 0));
        }
        Statement { sql, params }
    }
}
