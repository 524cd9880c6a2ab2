//! Event store schema.
//!
//! The schema version lives in SQLite's `user_version` header field. Each
//! step is applied in its own transaction together with the version bump, so
//! a database is always at exactly one known version.

use rusqlite::{Connection, TransactionBehavior};

use crate::error::DbError;

struct Step {
    name: &'static str,
    sql: &'static str,
}

/// Schema steps in order; step `i` upgrades version `i` to `i + 1`.
const STEPS: &[Step] = &[Step {
    name: "events",
    sql: include_str!("schema/001_events.sql"),
}];

/// The schema version this build writes and understands.
pub const SCHEMA_VERSION: u32 = STEPS.len() as u32;

/// Reads the schema version recorded in the database header.
pub fn schema_version(conn: &Connection) -> Result<u32, DbError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings the event store schema up to [`SCHEMA_VERSION`], returning how
/// many steps were applied.
///
/// # Errors
///
/// Returns [`DbError::SchemaTooNew`] for a database written by a newer
/// server, and [`DbError::Step`] if a step fails. A failed step leaves the
/// database at the previous version.
pub fn migrate(conn: &mut Connection) -> Result<u32, DbError> {
    apply_steps(conn, STEPS)
}

fn apply_steps(conn: &mut Connection, steps: &[Step]) -> Result<u32, DbError> {
    let supported = steps.len() as u32;
    let found = schema_version(conn)?;
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    for (version, step) in (found + 1..).zip(&steps[found as usize..]) {
        let failed = |source: rusqlite::Error| DbError::Step {
            version,
            name: step.name,
            source,
        };

        // Immediate: two servers opening the same file must not both upgrade.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(failed)?;
        tx.execute_batch(step.sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", version)
            .map_err(failed)?;
        tx.commit().map_err(failed)?;

        tracing::info!(version, step = step.name, "event store schema upgraded");
    }

    Ok(supported - found)
}
