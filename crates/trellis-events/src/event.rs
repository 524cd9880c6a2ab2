//! The immutable event value type.
//!
//! An [`Event`] is built exactly once from a raw wire/storage mapping by the
//! constructor registered for its format version. Content fields are fixed
//! at construction and the canonical JSON of everything except `signatures`
//! and `unsigned` is computed and cached at the same time.
//!
//! Three containers may change afterwards: `signatures`, `unsigned` and the
//! internal metadata. Each is held as an immutable snapshot behind a
//! [`Snapshot`]; a write builds a complete new value and swaps the pointer,
//! so a reader sharing the event observes either the old container or the
//! new one, never a partial edit.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use trellis_types::EventFormatVersion;

use crate::canonical::encode_canonical_map;
use crate::error::EventError;
use crate::metadata::InternalMetadata;

/// Digest algorithm name to encoded digest.
pub type Hashes = BTreeMap<String, String>;

/// Server name to key ID to encoded signature.
pub type Signatures = BTreeMap<String, BTreeMap<String, String>>;

/// Construction-time options chosen once by the storage and federation
/// layers at startup and passed into every event constructor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    /// In frozen mode an event's content can never be replaced, not even on
    /// an exclusively owned copy.
    pub frozen: bool,
}

/// Everything a format constructor needs to build an [`Event`].
#[derive(Debug, Clone, Default)]
pub struct EventParts {
    /// The event mapping as received over the wire or loaded from storage.
    pub raw: Map<String, Value>,
    /// The stored internal metadata mapping.
    pub internal_metadata: InternalMetadata,
    /// Set when an authorization evaluator rejected the event.
    pub rejected_reason: Option<String>,
    /// Canonical JSON already computed for `raw` (e.g. the stored copy).
    /// Trusted as-is when present.
    pub canonical_json: Option<String>,
}

impl EventParts {
    pub fn new(raw: Map<String, Value>) -> Self {
        Self {
            raw,
            ..Self::default()
        }
    }

    /// Builds parts from a JSON value, which must be an object.
    pub fn from_value(raw: Value) -> Result<Self, EventError> {
        match raw {
            Value::Object(map) => Ok(Self::new(map)),
            other => Err(EventError::malformed(
                "event",
                format!("expected a JSON object, got {}", json_kind(&other)),
            )),
        }
    }

    pub fn with_internal_metadata(mut self, internal_metadata: InternalMetadata) -> Self {
        self.internal_metadata = internal_metadata;
        self
    }

    pub fn with_rejected_reason(mut self, reason: Option<String>) -> Self {
        self.rejected_reason = reason;
        self
    }

    pub fn with_canonical_json(mut self, canonical_json: Option<String>) -> Self {
        self.canonical_json = canonical_json;
        self
    }
}

/// A container that is replaced wholesale, never edited in place.
///
/// The lock only guards the pointer swap; readers clone the `Arc` and then
/// work on an immutable snapshot. No caller code ever runs under the lock.
pub(crate) struct Snapshot<T>(RwLock<Arc<T>>);

impl<T> Snapshot<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(RwLock::new(Arc::new(value)))
    }

    pub(crate) fn load(&self) -> Arc<T> {
        // A poisoned lock still holds a complete `Arc`; nothing is half-written.
        Arc::clone(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn store(&self, value: T) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(value);
    }

    /// Builds the replacement from a snapshot with no lock held, then swaps
    /// it in only if no other writer got there first. On a lost race `f` runs
    /// again against the newer snapshot.
    pub(crate) fn update(&self, mut f: impl FnMut(&T) -> T) {
        loop {
            let current = self.load();
            let next = Arc::new(f(&current));
            let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
            // `current` keeps its allocation alive, so the address cannot be reused.
            if Arc::ptr_eq(&*guard, &current) {
                *guard = next;
                return;
            }
        }
    }
}

impl<T: Clone> Snapshot<T> {
    pub(crate) fn deep_copy(&self) -> Self {
        Self::new(T::clone(&self.load()))
    }
}

/// A room event.
///
/// Equality and hashing use `event_id` only; two events with the same ID are
/// the same event regardless of which signatures each copy has collected.
/// Events without an ID are identified by their canonical JSON instead.
pub struct Event {
    pub(crate) event_id: Option<String>,
    pub(crate) room_id: Option<String>,
    pub(crate) sender: Option<String>,
    pub(crate) event_type: Option<String>,
    pub(crate) state_key: Option<String>,
    pub(crate) depth: Option<i64>,
    pub(crate) redacts: Option<String>,
    pub(crate) origin_server_ts: Option<i64>,
    pub(crate) content: Map<String, Value>,
    pub(crate) hashes: Hashes,
    pub(crate) auth_event_ids: Vec<String>,
    pub(crate) prev_event_ids: Vec<String>,
    pub(crate) canonical_json: String,
    pub(crate) format_version: EventFormatVersion,
    pub(crate) rejected_reason: Option<String>,
    pub(crate) config: EventConfig,
    pub(crate) signatures: Snapshot<Signatures>,
    pub(crate) unsigned: Snapshot<Map<String, Value>>,
    pub(crate) internal_metadata: Snapshot<InternalMetadata>,
}

impl Event {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// The event type, e.g. `m.room.message`.
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    /// The state key of a state event.
    ///
    /// # Errors
    ///
    /// Returns `EventError::MissingField` when the event is not a state event
    /// (no `state_key`, or an explicit `null`). Check [`Event::is_state`]
    /// first.
    pub fn state_key(&self) -> Result<&str, EventError> {
        self.state_key
            .as_deref()
            .ok_or(EventError::MissingField("state_key"))
    }

    /// True iff the source mapping carried a non-null `state_key`. An empty
    /// string is a valid state key.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// Causal ordering hint; not a total order.
    pub fn depth(&self) -> Option<i64> {
        self.depth
    }

    /// The event this event redacts, for redaction events.
    pub fn redacts(&self) -> Option<&str> {
        self.redacts.as_deref()
    }

    /// Milliseconds since the Unix epoch on the originating server.
    pub fn origin_server_ts(&self) -> Option<i64> {
        self.origin_server_ts
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    pub fn hashes(&self) -> &Hashes {
        &self.hashes
    }

    /// Auth event IDs in the order the event listed them.
    pub fn auth_event_ids(&self) -> &[String] {
        &self.auth_event_ids
    }

    /// Prev event IDs in the order the event listed them.
    pub fn prev_event_ids(&self) -> &[String] {
        &self.prev_event_ids
    }

    /// The cached canonical JSON of every field except `signatures` and
    /// `unsigned`.
    pub fn canonical_json(&self) -> &str {
        &self.canonical_json
    }

    pub fn canonical_bytes(&self) -> &[u8] {
        self.canonical_json.as_bytes()
    }

    pub fn format_version(&self) -> EventFormatVersion {
        self.format_version
    }

    pub fn rejected_reason(&self) -> Option<&str> {
        self.rejected_reason.as_deref()
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected_reason.is_some()
    }

    pub fn config(&self) -> EventConfig {
        self.config
    }

    /// A snapshot of the current signatures.
    pub fn signatures(&self) -> Arc<Signatures> {
        self.signatures.load()
    }

    /// True once at least one signature is attached.
    pub fn is_signed(&self) -> bool {
        self.signatures.load().values().any(|keys| !keys.is_empty())
    }

    /// A snapshot of the current unsigned annotations.
    pub fn unsigned(&self) -> Arc<Map<String, Value>> {
        self.unsigned.load()
    }

    /// A snapshot of the current internal metadata.
    pub fn internal_metadata(&self) -> Arc<InternalMetadata> {
        self.internal_metadata.load()
    }

    /// Replaces the signatures container.
    pub fn set_signatures(&self, signatures: Signatures) {
        self.signatures.store(signatures);
    }

    /// Merges `additional` into a copy of the current signatures and swaps it
    /// in. Existing signatures for the same server and key are overwritten.
    pub fn add_signatures(&self, additional: Signatures) {
        self.signatures.update(|current| {
            let mut next = current.clone();
            for (server_name, keys) in &additional {
                next.entry(server_name.clone())
                    .or_default()
                    .extend(keys.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            next
        });
    }

    /// Replaces the unsigned container.
    pub fn set_unsigned(&self, unsigned: Map<String, Value>) {
        self.unsigned.store(unsigned);
    }

    /// Replaces the unsigned container with `f(current)`.
    ///
    /// `f` may run more than once when writers race, and may read this event.
    pub fn update_unsigned(&self, f: impl FnMut(&Map<String, Value>) -> Map<String, Value>) {
        self.unsigned.update(f);
    }

    pub fn set_internal_metadata(&self, internal_metadata: InternalMetadata) {
        self.internal_metadata.store(internal_metadata);
    }

    /// Replaces the internal metadata with `f(current)`. See [`Event::update_unsigned`].
    pub fn update_internal_metadata(&self, f: impl FnMut(&InternalMetadata) -> InternalMetadata) {
        self.internal_metadata.update(f);
    }

    /// Returns the event with `rejected_reason` recorded.
    pub fn with_rejected_reason(mut self, reason: impl Into<String>) -> Self {
        self.rejected_reason = Some(reason.into());
        self
    }

    /// Replaces the content of an exclusively owned event and recomputes its
    /// canonical JSON.
    ///
    /// Requires `&mut self`, so an event shared behind an `Arc` cannot be
    /// changed; take a [`Event::copy`] first.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Frozen` in frozen mode, or a canonicalization
    /// error if the new content cannot be encoded (the event is unchanged).
    pub fn replace_content(&mut self, content: Map<String, Value>) -> Result<(), EventError> {
        if self.config.frozen {
            return Err(EventError::Frozen(
                self.event_id.clone().unwrap_or_default(),
            ));
        }
        let mut dict: Map<String, Value> = serde_json::from_str(&self.canonical_json)?;
        dict.insert("content".to_string(), Value::Object(content.clone()));
        self.canonical_json = encode_canonical_map(&dict)?;
        self.content = content;
        Ok(())
    }

    /// Reconstructs the full wire mapping: the cached canonical fields with
    /// the current `signatures` and `unsigned` overlaid.
    pub fn get_dict(&self) -> Result<Map<String, Value>, EventError> {
        let mut dict: Map<String, Value> = serde_json::from_str(&self.canonical_json)?;
        let signatures = serde_json::to_value(&*self.signatures.load())?;
        dict.insert("signatures".to_string(), signatures);
        dict.insert(
            "unsigned".to_string(),
            Value::Object(Map::clone(&self.unsigned.load())),
        );
        Ok(dict)
    }

    /// An independent instance: identity and content values are shared, while
    /// `content`, `hashes`, `signatures`, `unsigned` and the internal metadata
    /// are deep copies, so changes to the copy never reach the original.
    pub fn copy(&self) -> Event {
        Event {
            event_id: self.event_id.clone(),
            room_id: self.room_id.clone(),
            sender: self.sender.clone(),
            event_type: self.event_type.clone(),
            state_key: self.state_key.clone(),
            depth: self.depth,
            redacts: self.redacts.clone(),
            origin_server_ts: self.origin_server_ts,
            content: self.content.clone(),
            hashes: self.hashes.clone(),
            auth_event_ids: self.auth_event_ids.clone(),
            prev_event_ids: self.prev_event_ids.clone(),
            canonical_json: self.canonical_json.clone(),
            format_version: self.format_version,
            rejected_reason: self.rejected_reason.clone(),
            config: self.config,
            signatures: self.signatures.deep_copy(),
            unsigned: self.unsigned.deep_copy(),
            internal_metadata: self.internal_metadata.deep_copy(),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        match (&self.event_id, &other.event_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.canonical_json == other.canonical_json,
            _ => false,
        }
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.event_id {
            Some(id) => id.hash(state),
            None => self.canonical_json.hash(state),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_id", &self.event_id)
            .field("type", &self.event_type)
            .field("state_key", &self.state_key)
            .field("format_version", &self.format_version)
            .finish_non_exhaustive()
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
