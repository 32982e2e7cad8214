//! Shared setup for the SQLite-backed integration tests.

#![allow(dead_code)]

use asupersync::Outcome;
use asupersync::runtime::RuntimeBuilder;
use serde_json::Value as JsonValue;
use sqlmancer::{Client, Error, Record, Registry};
use sqlmancer_sqlite::SqliteConnection;

const SCHEMA: &str = include_str!("../fixtures/sakila.sql");
const REGISTRY: &str = include_str!("../fixtures/sakila.json");

/// Run `future` to completion on a fresh current-thread runtime.
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(future)
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn unwrap_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected error, got {other:?}"),
    }
}

/// A client over a freshly seeded in-memory Sakila subset.
pub fn sakila() -> Client<SqliteConnection> {
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    conn.execute_raw(SCHEMA).expect("seed sakila schema");
    let registry = Registry::from_json(REGISTRY).expect("parse sakila registry");
    Client::new(conn, registry)
}

/// The `id` of each record, in result order.
pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.get("id").and_then(JsonValue::as_i64).expect("record id"))
        .collect()
}

/// The `id` of each record, sorted.
pub fn sorted_ids(records: &[Record]) -> Vec<i64> {
    let mut ids = ids(records);
    ids.sort_unstable();
    ids
}
