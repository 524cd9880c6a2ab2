use thiserror::Error;

/// Errors raised while opening or upgrading the event store database.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to create database connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    /// A schema step failed and was rolled back.
    #[error("schema step {version} ({name}) failed: {source}")]
    Step {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },

    /// The database was written by a server with a newer schema.
    #[error("database schema version {found} is newer than the supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
