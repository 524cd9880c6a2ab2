//! Outbound projections of an [`Event`] and the redaction rules they apply.
//!
//! Projections are computed per call from the event's current containers and
//! are never cached on the event.

use serde_json::{Map, Value};
use trellis_types::event_types;

use crate::error::EventError;
use crate::event::{Event, EventParts};
use crate::format::builtin_constructor;

/// Fields a redacted projection carries over unchanged even when a rule set
/// does not list them: identity plus everything signing depends on.
const PRESERVED_KEYS: &[&str] = &[
    "event_id",
    "type",
    "room_id",
    "sender",
    "state_key",
    "hashes",
    "signatures",
    "depth",
    "prev_events",
    "auth_events",
    "origin",
    "origin_server_ts",
];

/// Decides which parts of an event survive redaction.
///
/// Rules are allow-lists: anything not named is dropped.
pub trait RedactionRules: Send + Sync {
    /// Top-level keys kept on a redacted event.
    fn retained_top_level_keys(&self) -> &[&'static str];

    /// Content keys kept for events of `event_type`.
    fn retained_content_keys(&self, event_type: &str) -> &[&'static str];

    /// Keys kept inside `unsigned`.
    fn retained_unsigned_keys(&self) -> &[&'static str] {
        &["age_ts"]
    }
}

/// The redaction algorithm used by every format `V1` room version.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1RedactionRules;

impl RedactionRules for V1RedactionRules {
    fn retained_top_level_keys(&self) -> &[&'static str] {
        &[
            "event_id",
            "sender",
            "room_id",
            "hashes",
            "signatures",
            "content",
            "type",
            "state_key",
            "depth",
            "prev_events",
            "prev_state",
            "auth_events",
            "origin",
            "origin_server_ts",
            "membership",
        ]
    }

    fn retained_content_keys(&self, event_type: &str) -> &[&'static str] {
        match event_type {
            event_types::MEMBER => &["membership"],
            event_types::CREATE => &["creator"],
            event_types::JOIN_RULES => &["join_rule"],
            event_types::POWER_LEVELS => &[
                "users",
                "users_default",
                "events",
                "events_default",
                "state_default",
                "ban",
                "kick",
                "redact",
            ],
            event_types::ALIASES => &["aliases"],
            _ => &[],
        }
    }
}

/// Returns the reduced-content form of a wire mapping.
///
/// `content` is always present in the result (possibly empty) and so is
/// `unsigned`. The input is not modified.
pub fn redact_pdu(pdu: &Map<String, Value>, rules: &dyn RedactionRules) -> Map<String, Value> {
    let mut redacted = Map::new();

    for key in rules.retained_top_level_keys().iter().chain(PRESERVED_KEYS) {
        if let Some(value) = pdu.get(*key) {
            redacted.insert((*key).to_string(), value.clone());
        }
    }

    let event_type = pdu.get("type").and_then(Value::as_str).unwrap_or_default();
    let content = pdu.get("content").and_then(Value::as_object);
    redacted.insert(
        "content".to_string(),
        Value::Object(retain(content, rules.retained_content_keys(event_type))),
    );

    let unsigned = pdu.get("unsigned").and_then(Value::as_object);
    redacted.insert(
        "unsigned".to_string(),
        Value::Object(retain(unsigned, rules.retained_unsigned_keys())),
    );

    redacted
}

fn retain(source: Option<&Map<String, Value>>, keys: &[&str]) -> Map<String, Value> {
    let mut kept = Map::new();
    if let Some(source) = source {
        for key in keys {
            if let Some(value) = source.get(*key) {
                kept.insert((*key).to_string(), value.clone());
            }
        }
    }
    kept
}

/// Builds the redacted form of `event` under the `V1` rules.
pub fn prune_event(event: &Event) -> Result<Event, EventError> {
    prune_event_with_rules(event, &V1RedactionRules)
}

/// Builds the redacted form of `event` as a new event of the same format.
///
/// The pruned event carries a copy of the internal metadata with `redacted`
/// set, and keeps the rejection reason and configuration of the source.
pub fn prune_event_with_rules(event: &Event, rules: &dyn RedactionRules) -> Result<Event, EventError> {
    let pruned = redact_pdu(&event.get_dict()?, rules);
    let internal_metadata = event.internal_metadata().as_ref().clone().with_redacted(true);
    let parts = EventParts::new(pruned)
        .with_internal_metadata(internal_metadata)
        .with_rejected_reason(event.rejected_reason().map(str::to_string));

    tracing::debug!(
        event_id = event.event_id().unwrap_or("<none>"),
        "pruning event"
    );

    let constructor = builtin_constructor(event.format_version());
    constructor(parts, &event.config())
}

impl Event {
    /// The mapping sent to other servers, under the `V1` redaction rules.
    ///
    /// See [`Event::get_pdu_json_with_rules`].
    pub fn get_pdu_json(&self, now: Option<i64>) -> Result<Map<String, Value>, EventError> {
        self.get_pdu_json_with_rules(now, &V1RedactionRules)
    }

    /// The mapping sent to other servers.
    ///
    /// Starts from [`Event::get_dict`]. A redacted event is reduced through
    /// `rules`. When `now` is given, an integer `unsigned.age_ts` becomes
    /// `unsigned.age = now - age_ts`. `unsigned.redacted_because` is always
    /// dropped. Internal metadata never appears; the event itself is not
    /// modified.
    pub fn get_pdu_json_with_rules(
        &self,
        now: Option<i64>,
        rules: &dyn RedactionRules,
    ) -> Result<Map<String, Value>, EventError> {
        let mut pdu = self.get_dict()?;

        if self.internal_metadata().is_redacted() {
            tracing::trace!(
                event_id = self.event_id().unwrap_or("<none>"),
                "projecting redacted event"
            );
            pdu = redact_pdu(&pdu, rules);
        }

        if let Some(Value::Object(unsigned)) = pdu.get_mut("unsigned") {
            if let Some(now) = now {
                if let Some(age_ts) = unsigned.get("age_ts").and_then(Value::as_i64) {
                    unsigned.remove("age_ts");
                    unsigned.insert("age".to_string(), Value::from(now.saturating_sub(age_ts)));
                }
            }
            unsigned.remove("redacted_because");
        }

        Ok(pdu)
    }
}
