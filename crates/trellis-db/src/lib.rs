//! Database layer for the Trellis homeserver.
//!
//! Opens the SQLite event store behind an `r2d2` pool and keeps its schema
//! current. [`open_pool`] applies connection pragmas and schema upgrades
//! before handing the pool out, so every caller sees the same tables.
//!
//! SQLite in WAL mode gives concurrent readers with a single writer, which
//! matches event ingestion: one writer appending, many federation readers.
//! The schema ships inside the binary via `include_str!`.

mod error;
mod pool;
mod schema;

pub use error::DbError;
pub use pool::{open_pool, DbPool, DbSettings};
pub use schema::{migrate, schema_version, SCHEMA_VERSION};
