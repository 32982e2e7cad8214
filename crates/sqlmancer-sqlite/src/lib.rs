//! SQLite executor for sqlmancer.
//!
//! [`SqliteConnection`] implements the `Executor` and `Connection` traits
//! from `sqlmancer-core` over the bundled libsqlite3, so every builder in
//! `sqlmancer-query` can run against it directly or inside a
//! [`SqliteTransaction`].
//!
//! ```rust,ignore
//! use sqlmancer_sqlite::SqliteConnection;
//! use sqlmancer_core::{Cx, Executor, Value};
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE language (language_id INTEGER PRIMARY KEY, name TEXT)")?;
//! let cx = Cx::for_testing();
//! conn.execute(&cx, "INSERT INTO language (name) VALUES (?1)", &[Value::from("English")]).await;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite storage |
//! |-------|----------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Decimal`, `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Json`, `Array` | TEXT (JSON) |

// FFI bindings require unsafe code
#![allow(unsafe_code)]

pub mod connection;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteTransaction};

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe { std::ffi::CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_str()
        .unwrap_or("unknown")
}
