//! The event store connection pool.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::error::DbError;
use crate::schema::{migrate, SCHEMA_VERSION};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Where the event store lives and how its connections behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    /// Path to the SQLite file, or `:memory:`.
    pub path: String,

    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections. Ignored for `:memory:`.
    pub pool_max_size: u32,
}

impl DbSettings {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::file(":memory:")
    }

    fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            path: "trellis.db".to_string(),
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// Opens the event store: builds the pool and brings the schema to
/// [`SCHEMA_VERSION`] before any caller can use a connection.
///
/// An in-memory store is private to one SQLite connection, so its pool holds
/// exactly one connection that is never recycled.
///
/// # Errors
///
/// Returns [`DbError::Pool`] if no connection can be opened, and the errors of
/// [`migrate`] if the schema cannot be brought up to date.
pub fn open_pool(settings: &DbSettings) -> Result<DbPool, DbError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let busy_timeout_ms = settings.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(&settings.path)
        .with_flags(flags)
        .with_init(move |conn| configure_connection(conn, busy_timeout_ms));

    let builder = Pool::builder();
    let builder = if settings.is_in_memory() {
        builder.max_size(1).idle_timeout(None).max_lifetime(None)
    } else {
        builder.max_size(settings.pool_max_size)
    };
    let pool = builder.build(manager)?;

    let applied = migrate(&mut *pool.get()?)?;
    tracing::info!(
        path = %settings.path,
        schema_version = SCHEMA_VERSION,
        steps_applied = applied,
        pool_max_size = pool.max_size(),
        "event store opened"
    );

    Ok(pool)
}

/// Per-connection setup. Event edges reference `events`, so foreign keys must
/// be on for every connection, not just the first.
fn configure_connection(conn: &mut Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    // In-memory databases report "memory".
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("event store needs WAL journaling, got: {journal_mode}")),
        ));
    }
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = {busy_timeout_ms};"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::schema_version;

    #[test]
    fn in_memory_pool_is_migrated_and_shared() {
        let settings = DbSettings {
            pool_max_size: 4,
            ..DbSettings::in_memory()
        };
        let pool = open_pool(&settings).expect("pool creation should succeed");
        assert_eq!(pool.max_size(), 1);

        {
            let conn = pool.get().expect("should get a connection");
            assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
            conn.execute(
                "INSERT INTO events (event_id, format_version, canonical_json) VALUES ('$m', 1, '{}')",
                [],
            )
            .expect("insert should succeed");
        }

        let conn = pool.get().expect("should get the connection back");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("should count events");
        assert_eq!(count, 1);
    }

    #[test]
    fn connections_are_configured() {
        let settings = DbSettings {
            busy_timeout_ms: 2_500,
            ..DbSettings::in_memory()
        };
        let pool = open_pool(&settings).expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1, "foreign keys should be enabled");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500);

        let orphan = conn.execute(
            "INSERT INTO event_edges (event_id, ordinal, prev_event_id) VALUES ('$nope', 0, '$p')",
            [],
        );
        assert!(orphan.is_err(), "edges must reference a stored event");
    }
}
