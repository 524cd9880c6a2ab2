//! Constructor for format `V1` events.
//!
//! V1 events reference their DAG parents and auth events as
//! `[event_id, {algorithm: hash}]` pairs.

use serde_json::{Map, Value};
use trellis_types::EventFormatVersion;

use crate::canonical::encode_canonical_map;
use crate::error::EventError;
use crate::event::{json_kind, Event, EventConfig, EventParts, Hashes, Signatures, Snapshot};

/// Builds a V1 [`Event`] from its raw mapping.
///
/// Missing optional keys default to absent/empty; protocol completeness is
/// left to the authorization layer. `signatures` and `unsigned` are split off
/// before the canonical JSON is computed.
///
/// # Errors
///
/// Returns `EventError::Malformed` if a present field has the wrong JSON
/// type, or `EventError::Canonical` if the remaining mapping cannot be
/// canonically encoded. No partial event is returned.
pub fn construct_v1(parts: EventParts, config: &EventConfig) -> Result<Event, EventError> {
    let EventParts {
        mut raw,
        internal_metadata,
        rejected_reason,
        canonical_json,
    } = parts;

    let signatures: Signatures = match raw.remove("signatures") {
        None | Some(Value::Null) => Signatures::new(),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| EventError::malformed("signatures", e.to_string()))?,
    };

    let unsigned = match raw.remove("unsigned") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(EventError::malformed(
                "unsigned",
                format!("expected an object, got {}", json_kind(&other)),
            ))
        }
    };

    let content = match raw.get("content") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(EventError::malformed(
                "content",
                format!("expected an object, got {}", json_kind(other)),
            ))
        }
    };

    let hashes: Hashes = match raw.get("hashes") {
        None | Some(Value::Null) => Hashes::new(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| EventError::malformed("hashes", e.to_string()))?,
    };

    let auth_event_ids = edge_ids(&raw, "auth_events")?;
    let prev_event_ids = edge_ids(&raw, "prev_events")?;

    let canonical_json = match canonical_json {
        Some(json) => json,
        None => encode_canonical_map(&raw)?,
    };

    let event = Event {
        event_id: optional_string(&raw, "event_id")?,
        room_id: optional_string(&raw, "room_id")?,
        sender: optional_string(&raw, "sender")?,
        event_type: optional_string(&raw, "type")?,
        state_key: optional_string(&raw, "state_key")?,
        depth: optional_i64(&raw, "depth")?,
        redacts: optional_string(&raw, "redacts")?,
        origin_server_ts: optional_i64(&raw, "origin_server_ts")?,
        content,
        hashes,
        auth_event_ids,
        prev_event_ids,
        canonical_json,
        format_version: EventFormatVersion::V1,
        rejected_reason,
        config: *config,
        signatures: Snapshot::new(signatures),
        unsigned: Snapshot::new(unsigned),
        internal_metadata: Snapshot::new(internal_metadata),
    };

    tracing::trace!(
        event_id = event.event_id().unwrap_or("<none>"),
        format_version = %EventFormatVersion::V1,
        "constructed event"
    );

    Ok(event)
}

fn optional_string(raw: &Map<String, Value>, field: &'static str) -> Result<Option<String>, EventError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(EventError::malformed(
            field,
            format!("expected a string, got {}", json_kind(other)),
        )),
    }
}

fn optional_i64(raw: &Map<String, Value>, field: &'static str) -> Result<Option<i64>, EventError> {
    match raw.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| EventError::malformed(field, format!("{n} is not an integer"))),
        Some(other) => Err(EventError::malformed(
            field,
            format!("expected an integer, got {}", json_kind(other)),
        )),
    }
}

/// Extracts the event IDs of `[event_id, hashes]` pairs, keeping source
/// order and duplicates.
fn edge_ids(raw: &Map<String, Value>, field: &'static str) -> Result<Vec<String>, EventError> {
    let entries = match raw.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(EventError::malformed(
                field,
                format!("expected an array, got {}", json_kind(other)),
            ))
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| match entry.as_array().and_then(|pair| pair.first()) {
            Some(Value::String(event_id)) => Ok(event_id.clone()),
            _ => Err(EventError::malformed(
                field,
                format!("entry {i} is not an [event_id, hashes] pair"),
            )),
        })
        .collect()
}
