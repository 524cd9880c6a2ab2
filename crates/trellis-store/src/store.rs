//! Persistence operations for room events.
//!
//! Writes go through [`persist_event`], which stores the event row and its
//! ordered DAG edges in one transaction. The mutable containers are replaced
//! wholesale by the `update_*` functions, mirroring how they change on a
//! live [`Event`].

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use trellis_events::{Event, EventConfig, EventParts, FormatRegistry, InternalMetadata, Signatures};

use crate::error::StoreError;

const EVENT_COLUMNS: &str = "format_version, canonical_json, signatures_json, unsigned_json, \
                             internal_metadata_json, rejected_reason";

/// A stored event row before it is rebuilt.
struct StoredEvent {
    format_version: i64,
    canonical_json: String,
    signatures_json: String,
    unsigned_json: String,
    internal_metadata_json: String,
    rejected_reason: Option<String>,
}

impl StoredEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            format_version: row.get(0)?,
            canonical_json: row.get(1)?,
            signatures_json: row.get(2)?,
            unsigned_json: row.get(3)?,
            internal_metadata_json: row.get(4)?,
            rejected_reason: row.get(5)?,
        })
    }

    fn into_event(self, registry: &FormatRegistry, config: &EventConfig) -> Result<Event, StoreError> {
        let format = registry.resolve_format_code(self.format_version)?;

        let mut raw: Map<String, Value> = serde_json::from_str(&self.canonical_json)?;
        raw.insert(
            "signatures".to_string(),
            serde_json::from_str(&self.signatures_json)?,
        );
        raw.insert(
            "unsigned".to_string(),
            serde_json::from_str(&self.unsigned_json)?,
        );
        let internal_metadata: Map<String, Value> =
            serde_json::from_str(&self.internal_metadata_json)?;

        let parts = EventParts::new(raw)
            .with_internal_metadata(InternalMetadata::from_mapping(internal_metadata))
            .with_rejected_reason(self.rejected_reason)
            .with_canonical_json(Some(self.canonical_json));

        Ok(registry.construct(format, parts, config)?)
    }
}

/// Stores `event` with its edges, signatures, unsigned annotations and
/// internal metadata.
///
/// Returns `false` without writing anything if an event with the same ID is
/// already stored.
///
/// # Errors
///
/// Returns `StoreError::MissingEventId` for events without an ID, or a
/// database/serialization error. Nothing is written on error.
pub fn persist_event(conn: &Connection, event: &Event) -> Result<bool, StoreError> {
    let event_id = event.event_id().ok_or(StoreError::MissingEventId)?;

    let signatures_json = serde_json::to_string(&*event.signatures())?;
    let unsigned_json = serde_json::to_string(&*event.unsigned())?;
    let internal_metadata_json = serde_json::to_string(&*event.internal_metadata())?;

    let tx = conn.unchecked_transaction()?;

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO events
            (event_id, room_id, sender, event_type, state_key, depth, origin_server_ts,
             format_version, canonical_json, signatures_json, unsigned_json,
             internal_metadata_json, rejected_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            event_id,
            event.room_id(),
            event.sender(),
            event.event_type(),
            event.state_key().ok(),
            event.depth(),
            event.origin_server_ts(),
            event.format_version().as_u8(),
            event.canonical_json(),
            signatures_json,
            unsigned_json,
            internal_metadata_json,
            event.rejected_reason(),
        ],
    )?;

    if inserted == 0 {
        tracing::debug!(event_id, "event already stored");
        return Ok(false);
    }

    {
        let mut insert_edge = tx.prepare(
            "INSERT INTO event_edges (event_id, ordinal, prev_event_id, room_id)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (ordinal, prev_event_id) in event.prev_event_ids().iter().enumerate() {
            insert_edge.execute(params![event_id, ordinal, prev_event_id, event.room_id()])?;
        }

        let mut insert_auth = tx.prepare(
            "INSERT INTO event_auth (event_id, ordinal, auth_event_id) VALUES (?1, ?2, ?3)",
        )?;
        for (ordinal, auth_event_id) in event.auth_event_ids().iter().enumerate() {
            insert_auth.execute(params![event_id, ordinal, auth_event_id])?;
        }
    }

    tx.commit()?;

    tracing::debug!(
        event_id,
        room_id = event.room_id().unwrap_or_default(),
        format_version = %event.format_version(),
        "event persisted"
    );

    Ok(true)
}

/// Loads a stored event by ID.
pub fn get_event(
    conn: &Connection,
    registry: &FormatRegistry,
    config: &EventConfig,
    event_id: &str,
) -> Result<Option<Event>, StoreError> {
    let stored = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1"),
            params![event_id],
            StoredEvent::from_row,
        )
        .optional()?;

    stored
        .map(|stored| stored.into_event(registry, config))
        .transpose()
}

/// Loads up to `limit` events of a room, oldest first by arrival.
pub fn get_room_events(
    conn: &Connection,
    registry: &FormatRegistry,
    config: &EventConfig,
    room_id: &str,
    limit: i64,
) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM events
         WHERE room_id = ?1
         ORDER BY stream_ordering ASC
         LIMIT ?2"
    ))?;

    let rows = stmt
        .query_map(params![room_id, limit], StoredEvent::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|stored| stored.into_event(registry, config))
        .collect()
}

/// The prev event IDs of a stored event, in the order it listed them.
pub fn get_prev_event_ids(conn: &Connection, event_id: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT prev_event_id FROM event_edges WHERE event_id = ?1 ORDER BY ordinal ASC",
    )?;
    let ids = stmt
        .query_map(params![event_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// The auth event IDs of a stored event, in the order it listed them.
pub fn get_auth_event_ids(conn: &Connection, event_id: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT auth_event_id FROM event_auth WHERE event_id = ?1 ORDER BY ordinal ASC",
    )?;
    let ids = stmt
        .query_map(params![event_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Events in the room that no stored event lists as a prev event.
///
/// Ordered by depth, then arrival.
pub fn get_forward_extremities(conn: &Connection, room_id: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT e.event_id FROM events e
         WHERE e.room_id = ?1
           AND NOT EXISTS (
               SELECT 1 FROM event_edges ed WHERE ed.prev_event_id = e.event_id
           )
         ORDER BY e.depth ASC, e.stream_ordering ASC",
    )?;
    let ids = stmt
        .query_map(params![room_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// The smallest depth stored for the room, or `None` if the room has no
/// events with a depth.
pub fn get_min_depth(conn: &Connection, room_id: &str) -> Result<Option<i64>, StoreError> {
    let depth = conn.query_row(
        "SELECT MIN(depth) FROM events WHERE room_id = ?1",
        params![room_id],
        |row| row.get(0),
    )?;
    Ok(depth)
}

/// Replaces the stored signatures of an event. Returns `false` if the event
/// is not stored.
pub fn update_signatures(
    conn: &Connection,
    event_id: &str,
    signatures: &Signatures,
) -> Result<bool, StoreError> {
    update_column(conn, "signatures_json", event_id, &serde_json::to_string(signatures)?)
}

/// Replaces the stored unsigned annotations of an event. Returns `false` if
/// the event is not stored.
pub fn update_unsigned(
    conn: &Connection,
    event_id: &str,
    unsigned: &Map<String, Value>,
) -> Result<bool, StoreError> {
    update_column(conn, "unsigned_json", event_id, &serde_json::to_string(unsigned)?)
}

/// Replaces the stored internal metadata of an event. Returns `false` if
/// the event is not stored.
pub fn update_internal_metadata(
    conn: &Connection,
    event_id: &str,
    internal_metadata: &InternalMetadata,
) -> Result<bool, StoreError> {
    update_column(
        conn,
        "internal_metadata_json",
        event_id,
        &serde_json::to_string(internal_metadata)?,
    )
}

/// Records (or clears, with `None`) the rejection reason of an event.
pub fn set_rejected(
    conn: &Connection,
    event_id: &str,
    reason: Option<&str>,
) -> Result<bool, StoreError> {
    let updated = conn.execute(
        "UPDATE events SET rejected_reason = ?1 WHERE event_id = ?2",
        params![reason, event_id],
    )?;
    if updated > 0 {
        tracing::debug!(event_id, rejected = reason.is_some(), "rejection updated");
    }
    Ok(updated > 0)
}

// `column` is always one of the fixed names above, never caller input.
fn update_column(
    conn: &Connection,
    column: &'static str,
    event_id: &str,
    json: &str,
) -> Result<bool, StoreError> {
    let updated = conn.execute(
        &format!("UPDATE events SET {column} = ?1 WHERE event_id = ?2"),
        params![json, event_id],
    )?;
    Ok(updated > 0)
}
