//! Value binding and column decoding between sqlmancer and SQLite.
//!
//! SQLite has five storage classes (INTEGER, REAL, TEXT, BLOB, NULL), so
//! richer values are flattened on the way in:
//!
//! - booleans bind as 0/1
//! - decimals bind as text
//! - JSON documents and arrays bind as JSON text, which is what the
//!   `json_each` and `json(...)` shapes in compiled filters expect
//!
//! Reading back is by storage class only; the builder layer decodes by the
//! field's semantic type.

use libsqlite3_sys as ffi;
use sqlmancer_core::Value;
use std::ffi::{CStr, c_int};

fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    let Ok(len) = c_int::try_from(text.len()) else {
        return ffi::SQLITE_TOOBIG;
    };
    // SAFETY: stmt is a live statement handle; SQLITE_TRANSIENT makes SQLite
    // copy the buffer before this call returns
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            text.as_ptr().cast(),
            len,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Bind `value` to the 1-based parameter `index`.
///
/// # Safety
/// `stmt` must be a valid, non-finalized prepared statement handle.
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    match value {
        // SAFETY: caller guarantees stmt is valid
        Value::Null => unsafe { ffi::sqlite3_bind_null(stmt, index) },
        Value::Bool(b) => unsafe { ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)) },
        Value::Int(v) => unsafe { ffi::sqlite3_bind_int(stmt, index, *v) },
        Value::BigInt(v) => unsafe { ffi::sqlite3_bind_int64(stmt, index, *v) },
        Value::Double(v) => unsafe { ffi::sqlite3_bind_double(stmt, index, *v) },
        Value::Decimal(s) | Value::Text(s) => bind_text(stmt, index, s),
        Value::Json(json) => bind_text(stmt, index, &json.to_string()),
        Value::Array(_) => bind_text(stmt, index, &value.to_json().to_string()),
        Value::Bytes(bytes) => {
            let Ok(len) = c_int::try_from(bytes.len()) else {
                return ffi::SQLITE_TOOBIG;
            };
            // SAFETY: as in bind_text
            unsafe {
                ffi::sqlite3_bind_blob(
                    stmt,
                    index,
                    bytes.as_ptr().cast(),
                    len,
                    ffi::SQLITE_TRANSIENT(),
                )
            }
        }
    }
}

/// Read the 0-based column `index` of the current row.
///
/// # Safety
/// `stmt` must be a valid statement whose last step returned `SQLITE_ROW`.
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: caller guarantees stmt is positioned on a row
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => Value::BigInt(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, index)).unwrap_or(0);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let bytes = std::slice::from_raw_parts(ptr, len);
                    Value::Text(String::from_utf8_lossy(bytes).into_owned())
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, index)).unwrap_or(0);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    Value::Bytes(std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// Name of the 0-based result column `index`.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: caller guarantees stmt is valid; the name lives until finalize
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok().map(String::from)
        }
    }
}
