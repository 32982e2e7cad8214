//! Executor traits: the boundary between compiled statements and a database.
//!
//! - [`Executor`] - runs a compiled statement and its bindings
//! - [`Connection`] - an executor that can open transaction scopes
//! - [`TransactionOps`] - an executor bound to an open transaction
//! - [`IsolationLevel`] - SQL transaction isolation levels
//!
//! Builders are generic over [`Executor`], so the same builder state can run
//! against a bare connection or a caller-owned transaction. All operations
//! take a `Cx` context for cancellation and return an `Outcome`.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Dirty reads, non-repeatable reads and phantoms possible.
    ReadUncommitted,

    /// Only committed changes from others are visible.
    #[default]
    ReadCommitted,

    /// A consistent snapshot for the whole transaction.
    RepeatableRead,

    /// Transactions appear to execute sequentially.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL syntax for this isolation level.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Something that can run a compiled statement.
///
/// Native database errors must be returned unmodified; the builder layer does
/// not retry, translate or suppress them.
pub trait Executor: Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, crate::Error>> + Send {
        let rows = self.query(cx, sql, params);
        async move { rows.await.map(|rows| rows.into_iter().next()) }
    }

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Execute an INSERT and return the last inserted id.
    ///
    /// Used by dialects that cannot return generated keys from the statement.
    /// For a multi-row insert this is the id of the first inserted row.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, crate::Error>> + Send;
}

/// A database connection.
///
/// # Example
///
/// ```rust,ignore
/// let tx = conn.begin(&cx).await?;
/// client.model("Film")?.find_many().transaction(&tx).execute(&cx).await?;
/// tx.commit(&cx).await?;
/// ```
pub trait Connection: Executor + Send {
    /// The transaction type returned by this connection.
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// Begin a transaction with default isolation level (ReadCommitted).
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, crate::Error>> + Send {
        self.begin_with(cx, IsolationLevel::default())
    }

    /// Begin a transaction with a specific isolation level.
    fn begin_with(
        &self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, crate::Error>> + Send;

    /// Check if the connection is still valid.
    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Close the connection gracefully.
    fn close(self, cx: &Cx) -> impl Future<Output = Result<()>> + Send;
}

/// Operations on an open transaction.
///
/// Commit and rollback are always the caller's decision: nothing in the
/// builder layer ends a transaction on its behalf.
pub trait TransactionOps: Executor + Send {
    /// Create a savepoint within this transaction.
    fn savepoint(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Rollback to a previously created savepoint.
    fn rollback_to(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Release a savepoint.
    fn release(
        &self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Commit the transaction, making all changes permanent.
    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Roll back the transaction, discarding all changes.
    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_level_sql() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::ReadUncommitted.as_sql(), "READ UNCOMMITTED");
    }
}
