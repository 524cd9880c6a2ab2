//! Table-driven dispatch from room versions and event format versions to
//! event constructors.
//!
//! Callers never match on a format version themselves: storage and
//! federation resolve the room's version here and hand the raw mapping to
//! whatever constructor is registered. Supporting a new format means
//! registering one more constructor.

use std::collections::HashMap;

use trellis_types::{EventFormatVersion, RoomVersion, KNOWN_ROOM_VERSIONS};

use crate::error::EventError;
use crate::event::{Event, EventConfig, EventParts};
use crate::v1::construct_v1;

/// Builds an [`Event`] of one particular format.
pub type EventConstructor = fn(EventParts, &EventConfig) -> Result<Event, EventError>;

/// Returns the constructor compiled into this crate for `format`.
pub fn builtin_constructor(format: EventFormatVersion) -> EventConstructor {
    match format {
        EventFormatVersion::V1 => construct_v1,
    }
}

/// Maps room versions to event formats, and event formats to constructors.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    room_versions: HashMap<String, EventFormatVersion>,
    constructors: HashMap<EventFormatVersion, EventConstructor>,
}

impl FormatRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            room_versions: HashMap::new(),
            constructors: HashMap::new(),
        }
    }

    pub fn register_room_version(&mut self, identifier: impl Into<String>, format: EventFormatVersion) {
        self.room_versions.insert(identifier.into(), format);
    }

    pub fn register_format(&mut self, format: EventFormatVersion, constructor: EventConstructor) {
        self.constructors.insert(format, constructor);
    }

    /// Resolves the event format used by rooms of `room_version`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::UnknownRoomVersion` if the version is not
    /// registered. There is no fallback format.
    pub fn resolve_for_room(&self, room_version: &str) -> Result<EventFormatVersion, EventError> {
        self.room_versions.get(room_version).copied().ok_or_else(|| {
            tracing::debug!(room_version, "rejecting unknown room version");
            EventError::UnknownRoomVersion(room_version.to_string())
        })
    }

    /// Resolves the constructor registered for `format`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::UnknownFormatVersion` if none is registered.
    pub fn resolve_constructor(&self, format: EventFormatVersion) -> Result<EventConstructor, EventError> {
        self.constructors
            .get(&format)
            .copied()
            .ok_or(EventError::UnknownFormatVersion(i64::from(format.as_u8())))
    }

    /// Decodes a persisted format version code and checks it is registered.
    pub fn resolve_format_code(&self, code: i64) -> Result<EventFormatVersion, EventError> {
        let format = u8::try_from(code)
            .ok()
            .and_then(EventFormatVersion::from_u8)
            .ok_or(EventError::UnknownFormatVersion(code))?;
        self.resolve_constructor(format)?;
        Ok(format)
    }

    /// Builds an event of the given format.
    pub fn construct(
        &self,
        format: EventFormatVersion,
        parts: EventParts,
        config: &EventConfig,
    ) -> Result<Event, EventError> {
        let constructor = self.resolve_constructor(format)?;
        constructor(parts, config)
    }

    /// Builds an event for a room of the given version.
    pub fn construct_for_room(
        &self,
        room_version: &str,
        parts: EventParts,
        config: &EventConfig,
    ) -> Result<Event, EventError> {
        let format = self.resolve_for_room(room_version)?;
        self.construct(format, parts, config)
    }

    /// The registered room version identifiers, sorted.
    pub fn room_versions(&self) -> Vec<&str> {
        let mut versions: Vec<&str> = self.room_versions.keys().map(String::as_str).collect();
        versions.sort_unstable();
        versions
    }
}

impl Default for FormatRegistry {
    /// Every known room version and every built-in format.
    fn default() -> Self {
        let mut registry = Self::empty();
        for RoomVersion {
            identifier,
            event_format,
        } in KNOWN_ROOM_VERSIONS
        {
            registry.register_room_version(*identifier, *event_format);
        }
        for format in EventFormatVersion::ALL {
            registry.register_format(*format, builtin_constructor(*format));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_room_versions_resolve_to_v1() {
        let registry = FormatRegistry::default();
        for version in ["1", "2", "state-v2-test", "vdh-test-version"] {
            assert_eq!(
                registry.resolve_for_room(version).unwrap(),
                EventFormatVersion::V1
            );
        }
    }

    #[test]
    fn unknown_room_version_fails() {
        let registry = FormatRegistry::default();
        for version in ["unsupported-version-7", "", "3", "1 "] {
            let err = registry.resolve_for_room(version).unwrap_err();
            assert!(
                matches!(err, EventError::UnknownRoomVersion(ref v) if v == version),
                "unexpected error for {version:?}: {err:?}"
            );
        }
    }

    #[test]
    fn unregistered_format_fails() {
        let registry = FormatRegistry::empty();
        assert!(matches!(
            registry.resolve_constructor(EventFormatVersion::V1),
            Err(EventError::UnknownFormatVersion(1))
        ));
    }

    #[test]
    fn format_codes_decode() {
        let registry = FormatRegistry::default();
        assert_eq!(registry.resolve_format_code(1).unwrap(), EventFormatVersion::V1);
        assert!(matches!(
            registry.resolve_format_code(7),
            Err(EventError::UnknownFormatVersion(7))
        ));
        assert!(matches!(
            registry.resolve_format_code(-1),
            Err(EventError::UnknownFormatVersion(-1))
        ));
        assert!(matches!(
            registry.resolve_format_code(257),
            Err(EventError::UnknownFormatVersion(257))
        ));
    }

    #[test]
    fn room_version_registered_without_constructor_fails_at_construction() {
        let mut registry = FormatRegistry::empty();
        registry.register_room_version("custom", EventFormatVersion::V1);
        let parts = EventParts::from_value(json!({"type": "m.room.message"})).unwrap();
        let err = registry
            .construct_for_room("custom", parts, &EventConfig::default())
            .unwrap_err();
        assert!(matches!(err, EventError::UnknownFormatVersion(1)));
    }

    #[test]
    fn constructs_through_registered_constructor() {
        let registry = FormatRegistry::default();
        let parts = EventParts::from_value(json!({
            "event_id": "$abc:example.org",
            "type": "m.room.message",
        }))
        .unwrap();
        let event = registry
            .construct_for_room("2", parts, &EventConfig::default())
            .unwrap();
        assert_eq!(event.event_id(), Some("$abc:example.org"));
        assert_eq!(event.format_version(), EventFormatVersion::V1);
    }

    #[test]
    fn lists_room_versions_sorted() {
        let registry = FormatRegistry::default();
        assert_eq!(
            registry.room_versions(),
            vec!["1", "2", "state-v2-test", "vdh-test-version"]
        );
    }
}
