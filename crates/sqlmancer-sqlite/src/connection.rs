//! SQLite connection and transaction executors.
//!
//! The handle is serialized behind a mutex. Every executor call runs to
//! completion synchronously and hands back an already-resolved future, so a
//! builder's statements reach SQLite strictly in the order it awaits them.

#![allow(clippy::result_large_err)]
#![allow(clippy::borrow_as_ptr)]

use crate::types;
use libsqlite3_sys as ffi;
use sqlmancer_core::{
    Connection, Cx, Error, Executor, IsolationLevel, Outcome, Row, TransactionOps, Value,
    error::{
        ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
        TransactionErrorKind,
    },
    row::ColumnInfo,
};
use std::ffi::{CStr, CString, c_int};
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Configuration for opening a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or `:memory:`
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds; zero leaves SQLite's default
    pub busy_timeout_ms: u32,
}

/// How the database file is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read_only: bool,
    pub create: bool,
    /// Interpret the path as a `file:` URI
    pub uri: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Read-write, creating the file if needed.
    pub fn create_read_write() -> Self {
        Self {
            create: true,
            ..Self::default()
        }
    }

    fn bits(self) -> c_int {
        let mut bits = if self.read_only {
            ffi::SQLITE_OPEN_READONLY
        } else {
            ffi::SQLITE_OPEN_READWRITE
        };
        if self.create && !self.read_only {
            bits |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            bits |= ffi::SQLITE_OPEN_URI;
        }
        bits | ffi::SQLITE_OPEN_FULLMUTEX
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl SqliteConfig {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }

    pub fn memory() -> Self {
        Self::file(":memory:")
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

struct Handle {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the handle is opened with SQLITE_OPEN_FULLMUTEX and every access
// goes through the connection's Mutex.
unsafe impl Send for Handle {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    handle: Mutex<Handle>,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a database with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let c_path = CString::new(config.path.as_str())
            .map_err(|_| connect_error("Invalid path: contains null byte".to_string()))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: valid C string and out pointer; the return code is checked
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, config.flags.bits(), ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: a failed open still allocates a handle that must be closed
                let message = unsafe { last_error(db) };
                unsafe { ffi::sqlite3_close(db) };
                message
            };
            return Err(connect_error(format!("Failed to open database: {message}")));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is a freshly opened handle
            unsafe { ffi::sqlite3_busy_timeout(db, ms) };
        }

        tracing::debug!(path = %config.path, read_only = config.flags.read_only, "Opened SQLite database");
        Ok(Self {
            handle: Mutex::new(Handle {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        })
    }

    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Handle>, Error> {
        self.handle.lock().map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: "SQLite connection mutex poisoned".to_string(),
                source: None,
            })
        })
    }

    /// Run one or more `;`-separated statements without bindings, for
    /// schema setup and fixtures.
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let handle = self.lock()?;
        exec_raw(handle.db, sql)
    }

    pub fn last_insert_rowid(&self) -> Result<i64, Error> {
        let handle = self.lock()?;
        // SAFETY: db is open for the lifetime of self
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(handle.db) })
    }

    pub(crate) fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let handle = self.lock()?;
        let stmt = Statement::prepare(handle.db, sql)?;
        stmt.bind(params)?;

        let count = stmt.column_count();
        let names = (0..count)
            // SAFETY: stmt is valid and i is in range
            .map(|i| unsafe { types::column_name(stmt.raw, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        while stmt.step()? {
            // SAFETY: the last step returned SQLITE_ROW
            let values = (0..count).map(|i| unsafe { types::read_column(stmt.raw, i) }).collect();
            rows.push(Row::with_columns(Arc::clone(&columns), values));
        }
        tracing::trace!(sql, rows = rows.len(), "SQLite query");
        Ok(rows)
    }

    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        let handle = self.lock()?;
        let stmt = Statement::prepare(handle.db, sql)?;
        stmt.bind(params)?;
        while stmt.step()? {}
        // SAFETY: db is open
        let changes = unsafe { ffi::sqlite3_changes(handle.db) };
        tracing::trace!(sql, changes, "SQLite execute");
        Ok(u64::try_from(changes).unwrap_or(0))
    }

    /// Rowid of the first row inserted by a (possibly multi-row) INSERT.
    fn insert_sync(&self, sql: &str, params: &[Value]) -> Result<i64, Error> {
        let handle = self.lock()?;
        let stmt = Statement::prepare(handle.db, sql)?;
        stmt.bind(params)?;
        while stmt.step()? {}
        // SAFETY: db is open
        let (last, changes) = unsafe {
            (
                ffi::sqlite3_last_insert_rowid(handle.db),
                i64::from(ffi::sqlite3_changes(handle.db)),
            )
        };
        Ok(last - (changes - 1).max(0))
    }

    fn begin_sync(&self, isolation: IsolationLevel) -> Result<(), Error> {
        let mut handle = self.lock()?;
        if handle.in_transaction {
            return Err(transaction_error(
                TransactionErrorKind::AlreadyActive,
                "Already in a transaction",
            ));
        }
        // SQLite has no isolation levels; the closest lock modes stand in
        let begin = match isolation {
            IsolationLevel::Serializable => "BEGIN EXCLUSIVE",
            IsolationLevel::RepeatableRead | IsolationLevel::ReadCommitted => "BEGIN IMMEDIATE",
            IsolationLevel::ReadUncommitted => "BEGIN DEFERRED",
        };
        exec_raw(handle.db, begin)?;
        handle.in_transaction = true;
        tracing::debug!(isolation = isolation.as_sql(), "Transaction started");
        Ok(())
    }

    fn finish_sync(&self, sql: &str) -> Result<(), Error> {
        let mut handle = self.lock()?;
        if !handle.in_transaction {
            return Err(transaction_error(
                TransactionErrorKind::NotActive,
                "Not in a transaction",
            ));
        }
        handle.in_transaction = false;
        exec_raw(handle.db, sql)?;
        tracing::debug!(statement = sql, "Transaction finished");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Ok(handle) = self.handle.get_mut() {
            if !handle.db.is_null() {
                // SAFETY: db is open and no statement outlives a call
                unsafe { ffi::sqlite3_close(handle.db) };
                handle.db = ptr::null_mut();
            }
        }
    }
}

/// A transaction on a [`SqliteConnection`].
///
/// Dropping it without `commit` or `rollback` rolls it back.
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    finished: bool,
}

impl std::fmt::Debug for SqliteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.finish_sync("ROLLBACK") {
                tracing::warn!(error = %e, "Rollback of dropped transaction failed");
            }
        }
    }
}

fn ready<T: Send>(result: Result<T, Error>) -> impl Future<Output = Outcome<T, Error>> + Send {
    async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
}

impl Executor for SqliteConnection {
    fn query(&self, _cx: &Cx, sql: &str, params: &[Value]) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        ready(self.query_sync(sql, params))
    }

    fn execute(&self, _cx: &Cx, sql: &str, params: &[Value]) -> impl Future<Output = Outcome<u64, Error>> + Send {
        ready(self.execute_sync(sql, params))
    }

    fn insert(&self, _cx: &Cx, sql: &str, params: &[Value]) -> impl Future<Output = Outcome<i64, Error>> + Send {
        ready(self.insert_sync(sql, params))
    }
}

impl Connection for SqliteConnection {
    type Tx<'conn>
        = SqliteTransaction<'conn>
    where
        Self: 'conn;

    fn begin_with(
        &self,
        _cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        ready(self.begin_sync(isolation).map(|()| SqliteTransaction {
            conn: self,
            finished: false,
        }))
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        ready(self.query_sync("SELECT 1", &[]).map(|_| ()))
    }

    async fn close(self, _cx: &Cx) -> sqlmancer_core::Result<()> {
        // the handle is closed on drop
        Ok(())
    }
}

impl Executor for SqliteTransaction<'_> {
    fn query(&self, _cx: &Cx, sql: &str, params: &[Value]) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        ready(self.conn.query_sync(sql, params))
    }

    fn execute(&self, _cx: &Cx, sql: &str, params: &[Value]) -> impl Future<Output = Outcome<u64, Error>> + Send {
        ready(self.conn.execute_sync(sql, params))
    }

    fn insert(&self, _cx: &Cx, sql: &str, params: &[Value]) -> impl Future<Output = Outcome<i64, Error>> + Send {
        ready(self.conn.insert_sync(sql, params))
    }
}

impl TransactionOps for SqliteTransaction<'_> {
    fn savepoint(&self, _cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        ready(self.conn.execute_raw(&format!("SAVEPOINT {}", quote(name))))
    }

    fn rollback_to(&self, _cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        ready(self.conn.execute_raw(&format!("ROLLBACK TO {}", quote(name))))
    }

    fn release(&self, _cx: &Cx, name: &str) -> impl Future<Output = Outcome<(), Error>> + Send {
        ready(self.conn.execute_raw(&format!("RELEASE {}", quote(name))))
    }

    async fn commit(mut self, _cx: &Cx) -> Outcome<(), Error> {
        self.finished = true;
        self.conn.finish_sync("COMMIT").map_or_else(Outcome::Err, Outcome::Ok)
    }

    async fn rollback(mut self, _cx: &Cx) -> Outcome<(), Error> {
        self.finished = true;
        self.conn.finish_sync("ROLLBACK").map_or_else(Outcome::Err, Outcome::Ok)
    }
}

/// A prepared statement, finalized on drop.
struct Statement<'a> {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql: &'a str,
}

impl<'a> Statement<'a> {
    fn prepare(db: *mut ffi::sqlite3, sql: &'a str) -> Result<Self, Error> {
        let c_sql = CString::new(sql).map_err(|_| {
            Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                sql: Some(sql.to_string()),
                message: "SQL contains null byte".to_string(),
                source: None,
            })
        })?;
        let len = c_int::try_from(c_sql.as_bytes().len()).map_err(|_| query_error(db, sql, ffi::SQLITE_TOOBIG))?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: valid handle, C string and out pointer
        let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut raw, ptr::null_mut()) };
        if rc != ffi::SQLITE_OK {
            return Err(query_error(db, sql, rc));
        }
        Ok(Self { raw, db, sql })
    }

    fn bind(&self, params: &[Value]) -> Result<(), Error> {
        for (i, param) in params.iter().enumerate() {
            let index = c_int::try_from(i + 1).unwrap_or(c_int::MAX);
            // SAFETY: raw is a live statement
            let rc = unsafe { types::bind_value(self.raw, index, param) };
            if rc != ffi::SQLITE_OK {
                let mut err = query_error(self.db, self.sql, rc);
                if let Error::Query(q) = &mut err {
                    q.message = format!("Failed to bind parameter {}: {}", i + 1, q.message);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn column_count(&self) -> c_int {
        // SAFETY: raw is a live statement
        unsafe { ffi::sqlite3_column_count(self.raw) }
    }

    /// Advance; `true` while a row is available.
    fn step(&self) -> Result<bool, Error> {
        // SAFETY: raw is a live statement
        match unsafe { ffi::sqlite3_step(self.raw) } {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            rc => Err(query_error(self.db, self.sql, rc)),
        }
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        // SAFETY: raw came from sqlite3_prepare_v2 and is finalized once
        unsafe { ffi::sqlite3_finalize(self.raw) };
    }
}

fn exec_raw(db: *mut ffi::sqlite3, sql: &str) -> Result<(), Error> {
    let c_sql = CString::new(sql).map_err(|_| {
        Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some(sql.to_string()),
            message: "SQL contains null byte".to_string(),
            source: None,
        })
    })?;
    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();
    // SAFETY: valid handle and C string; errmsg is freed below
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };
    if rc == ffi::SQLITE_OK {
        return Ok(());
    }
    let message = if errmsg.is_null() {
        error_string(rc)
    } else {
        // SAFETY: errmsg was allocated by sqlite3_exec
        unsafe {
            let message = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
            ffi::sqlite3_free(errmsg.cast());
            message
        }
    };
    Err(Error::Query(QueryError {
        kind: error_code_to_kind(rc),
        sql: Some(sql.to_string()),
        message,
        source: None,
    }))
}

/// # Safety
/// `db` must be a valid handle.
unsafe fn last_error(db: *mut ffi::sqlite3) -> String {
    // SAFETY: the message lives until the next call on db
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)).to_string_lossy().into_owned() }
}

fn error_string(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe { CStr::from_ptr(ffi::sqlite3_errstr(code)).to_string_lossy().into_owned() }
}

/// The native error, passed through unmodified apart from classification.
fn query_error(db: *mut ffi::sqlite3, sql: &str, rc: c_int) -> Error {
    // SAFETY: db is a valid handle for every caller
    let (message, code) = unsafe { (last_error(db), ffi::sqlite3_errcode(db)) };
    let code = if code == ffi::SQLITE_OK { rc } else { code };
    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message,
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH | ffi::SQLITE_READONLY => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        _ => QueryErrorKind::Database,
    }
}

fn connect_error(message: String) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message,
        source: None,
    })
}

fn transaction_error(kind: TransactionErrorKind, message: &str) -> Error {
    Error::Transaction(TransactionError {
        kind,
        message: message.to_string(),
    })
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
