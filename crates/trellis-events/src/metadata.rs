//! Local-only bookkeeping carried alongside each event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const OUTLIER: &str = "outlier";
const INVITE_FROM_REMOTE: &str = "invite_from_remote";
const SEND_ON_BEHALF_OF: &str = "send_on_behalf_of";
const REDACTED: &str = "redacted";

/// Flags computed or recorded locally for an event.
///
/// Internal metadata is never part of the signed content, never sent over
/// federation, and is persisted only by the storage layer next to the event.
/// It is held as a plain mapping so that flags written by newer code survive
/// a load/store cycle through older code unchanged.
///
/// Absent flags read as `false` / `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalMetadata {
    fields: Map<String, Value>,
}

impl InternalMetadata {
    /// Builds the sidecar from a stored mapping.
    pub fn from_mapping(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns the mapping to persist. Round-trips exactly with
    /// [`InternalMetadata::from_mapping`].
    pub fn to_mapping(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    /// Whether the event was stored without its antecedent graph.
    pub fn is_outlier(&self) -> bool {
        self.flag(OUTLIER)
    }

    /// Whether the event is an invite that originated on another server.
    pub fn is_invite_from_remote(&self) -> bool {
        self.flag(INVITE_FROM_REMOTE)
    }

    /// The server this event should be sent on behalf of, if any.
    ///
    /// Set when forwarding the initial join of a remote server.
    pub fn get_send_on_behalf_of(&self) -> Option<&str> {
        self.fields.get(SEND_ON_BEHALF_OF).and_then(Value::as_str)
    }

    /// Whether the event has been redacted and must be projected with
    /// reduced content.
    pub fn is_redacted(&self) -> bool {
        self.flag(REDACTED)
    }

    /// Returns a raw field, for flags without a typed accessor.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn with_outlier(self, outlier: bool) -> Self {
        self.with(OUTLIER, Value::Bool(outlier))
    }

    pub fn with_invite_from_remote(self, invite_from_remote: bool) -> Self {
        self.with(INVITE_FROM_REMOTE, Value::Bool(invite_from_remote))
    }

    pub fn with_send_on_behalf_of(self, server_name: impl Into<String>) -> Self {
        self.with(SEND_ON_BEHALF_OF, Value::String(server_name.into()))
    }

    pub fn with_redacted(self, redacted: bool) -> Self {
        self.with(REDACTED, Value::Bool(redacted))
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    fn flag(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl From<Map<String, Value>> for InternalMetadata {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_mapping(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn defaults_when_absent() {
        let meta = InternalMetadata::default();
        assert!(!meta.is_outlier());
        assert!(!meta.is_invite_from_remote());
        assert!(!meta.is_redacted());
        assert_eq!(meta.get_send_on_behalf_of(), None);
    }

    #[test]
    fn reads_stored_flags() {
        let meta = InternalMetadata::from_mapping(mapping(json!({
            "outlier": true,
            "invite_from_remote": true,
            "send_on_behalf_of": "remote.example.org",
        })));
        assert!(meta.is_outlier());
        assert!(meta.is_invite_from_remote());
        assert_eq!(meta.get_send_on_behalf_of(), Some("remote.example.org"));
    }

    #[test]
    fn mapping_round_trips_unknown_keys() {
        let stored = mapping(json!({
            "outlier": false,
            "stream_ordering": 42,
            "txn_id": "m1234",
        }));
        let meta = InternalMetadata::from_mapping(stored.clone());
        assert_eq!(meta.to_mapping(), stored);
        assert_eq!(meta.get("stream_ordering"), Some(&json!(42)));
    }

    #[test]
    fn non_boolean_flag_reads_as_false() {
        let meta = InternalMetadata::from_mapping(mapping(json!({"outlier": "yes"})));
        assert!(!meta.is_outlier());
    }

    #[test]
    fn builders_leave_original_untouched() {
        let original = InternalMetadata::default();
        let updated = original.clone().with_outlier(true).with_redacted(true);
        assert!(!original.is_outlier());
        assert!(updated.is_outlier());
        assert!(updated.is_redacted());
    }

    #[test]
    fn serializes_as_plain_object() {
        let meta = InternalMetadata::default().with_send_on_behalf_of("a.example");
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value, json!({"send_on_behalf_of": "a.example"}));
    }
}
