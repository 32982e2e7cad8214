//! SQL expressions.
//!
//! Every compiler in this crate lowers its input into an [`Expr`] tree. The
//! tree is rendered in a single left-to-right pass, so bound parameters are
//! collected in exactly the order their placeholders appear in the text.

use crate::select::SelectQuery;
use sqlmancer_core::{Dialect, Value};

/// A SQL expression usable in WHERE, ORDER BY and projections.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table alias
    Column {
        /// Table alias
        table: Option<String>,
        /// Column name
        name: String,
    },

    /// Bound parameter
    Literal(Value),

    /// Raw SQL fragment
    Raw(String),

    /// Binary comparison (`a = b`, `a @> b`)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Conjunction; rendered parenthesized when it has more than one term
    And(Vec<Expr>),

    /// Disjunction; rendered parenthesized when it has more than one term
    Or(Vec<Expr>),

    /// `NOT (expr)`
    Not(Box<Expr>),

    /// IN list
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// LIKE / ILIKE pattern
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        case_insensitive: bool,
    },

    /// Function call (e.g. `COUNT(*)`, `JSON_CONTAINS(a, b)`)
    Function { name: String, args: Vec<Expr> },

    /// `CAST(expr AS type)`
    Cast { expr: Box<Expr>, type_name: String },

    /// EXISTS / NOT EXISTS subquery
    Exists {
        query: Box<SelectQuery>,
        negated: bool,
    },

    /// `expr IN (subquery)`
    InSubquery {
        expr: Box<Expr>,
        query: Box<SelectQuery>,
    },

    /// Scalar subquery
    Subquery(Box<SelectQuery>),

    /// Fragments rendered back to back; used for dialect-specific shapes
    /// that mix fixed text with bound values
    Sequence(Vec<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Containment (@>)
    Contains,
    /// Contained by (<@)
    ContainedBy,
    /// Array overlap (&&)
    Overlaps,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Contains => "@>",
            BinaryOp::ContainedBy => "<@",
            BinaryOp::Overlaps => "&&",
        }
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Create a column reference qualified by a table alias.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Create an unqualified column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Create a bound parameter.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// The always-true predicate.
    pub fn always() -> Self {
        Expr::Raw("1 = 1".to_string())
    }

    /// The always-false predicate.
    pub fn never() -> Self {
        Expr::Raw("1 = 0".to_string())
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// `COUNT(*)`
    pub fn count_star() -> Self {
        Expr::Raw("COUNT(*)".to_string())
    }

    // ==================== Comparisons ====================

    pub fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, values: Vec<Expr>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values,
            negated: false,
        }
    }

    pub fn not_in_list(self, values: Vec<Expr>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values,
            negated: true,
        }
    }

    pub fn in_subquery(self, query: SelectQuery) -> Self {
        Expr::InSubquery {
            expr: Box::new(self),
            query: Box::new(query),
        }
    }

    pub fn cast(self, type_name: impl Into<String>) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            type_name: type_name.into(),
        }
    }

    // ==================== Logical ====================

    /// Combine with AND, flattening nested conjunctions.
    pub fn and(self, other: Expr) -> Self {
        let mut terms = match self {
            Expr::And(terms) => terms,
            other => vec![other],
        };
        terms.push(other);
        Expr::And(terms)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Combine a list of predicates with AND; `None` when the list is empty.
    pub fn all(mut terms: Vec<Expr>) -> Option<Expr> {
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(Expr::And(terms)),
        }
    }

    pub fn exists(query: SelectQuery) -> Self {
        Expr::Exists {
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn subquery(query: SelectQuery) -> Self {
        Expr::Subquery(Box::new(query))
    }

    // ==================== SQL Generation ====================

    /// Build SQL string with the given dialect, appending bound values to
    /// `params`. Placeholder numbers continue from `offset + params.len()`.
    pub fn build_with_dialect(
        &self,
        dialect: Dialect,
        params: &mut Vec<Value>,
        offset: usize,
    ) -> String {
        match self {
            Expr::Column { table, name } => match table {
                Some(t) => format!("{}.{}", dialect.quote_alias(t), dialect.quote_alias(name)),
                None => dialect.quote_alias(name),
            },

            Expr::Literal(value) => {
                params.push(value.clone());
                dialect.placeholder(offset + params.len())
            }

            Expr::Raw(sql) => sql.clone(),

            Expr::Binary { left, op, right } => {
                let left_sql = left.build_with_dialect(dialect, params, offset);
                let right_sql = right.build_with_dialect(dialect, params, offset);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::And(terms) => join_terms(terms, " AND ", dialect, params, offset),

            Expr::Or(terms) => join_terms(terms, " OR ", dialect, params, offset),

            Expr::Not(expr) => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                format!("NOT ({expr_sql})")
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let value_sqls: Vec<_> = values
                    .iter()
                    .map(|v| v.build_with_dialect(dialect, params, offset))
                    .collect();
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let pattern_sql = pattern.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { "NOT " } else { "" };
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                format!("{expr_sql} {not_str}{op} {pattern_sql}")
            }

            Expr::Function { name, args } => {
                let arg_sqls: Vec<_> = args
                    .iter()
                    .map(|a| a.build_with_dialect(dialect, params, offset))
                    .collect();
                format!("{name}({})", arg_sqls.join(", "))
            }

            Expr::Cast { expr, type_name } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                format!("CAST({expr_sql} AS {type_name})")
            }

            Expr::Exists { query, negated } => {
                let query_sql = query.build_with_dialect(dialect, params, offset);
                let not_str = if *negated { "NOT " } else { "" };
                format!("{not_str}EXISTS ({query_sql})")
            }

            Expr::InSubquery { expr, query } => {
                let expr_sql = expr.build_with_dialect(dialect, params, offset);
                let query_sql = query.build_with_dialect(dialect, params, offset);
                format!("{expr_sql} IN ({query_sql})")
            }

            Expr::Subquery(query) => {
                let query_sql = query.build_with_dialect(dialect, params, offset);
                format!("({query_sql})")
            }

            Expr::Sequence(parts) => parts
                .iter()
                .map(|p| p.build_with_dialect(dialect, params, offset))
                .collect(),
        }
    }
}

fn join_terms(
    terms: &[Expr],
    separator: &str,
    dialect: Dialect,
    params: &mut Vec<Value>,
    offset: usize,
) -> String {
    let sqls: Vec<_> = terms
        .iter()
        .map(|t| t.build_with_dialect(dialect, params, offset))
        .collect();
    match sqls.len() {
        0 => "1 = 1".to_string(),
        1 => sqls.into_iter().collect(),
        _ => format!("({})", sqls.join(separator)),
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}
