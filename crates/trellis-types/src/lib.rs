//! Shared types and constants for the Trellis homeserver.
//!
//! This crate provides the identifiers every other Trellis crate agrees on:
//! event format versions, the table of known room versions, and the
//! well-known event type names. It has no dependencies on the rest of the
//! workspace so that the storage, event and server crates can all share it
//! without cycles.

use serde::{Deserialize, Serialize};

mod room_version;
pub use room_version::{RoomVersion, DEFAULT_ROOM_VERSION, KNOWN_ROOM_VERSIONS};

/// Event format versions.
///
/// A format version selects the canonicalization and hashing scheme for the
/// events of a room. Several room versions may share one format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventFormatVersion {
    /// `[event_id, hashes]` edge pairs, server-assigned event IDs.
    V1 = 1,
}

impl EventFormatVersion {
    /// Every format version this build understands, oldest first.
    pub const ALL: &'static [EventFormatVersion] = &[EventFormatVersion::V1];

    /// Returns the numeric code persisted alongside stored events.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a persisted numeric code to a format version.
    ///
    /// Returns `None` if the code does not correspond to a known format.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::V1),
            _ => None,
        }
    }

    /// Returns the string label for this format version.
    pub fn label(self) -> &'static str {
        match self {
            Self::V1 => "V1",
        }
    }
}

impl std::fmt::Display for EventFormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Well-known event types referenced by the redaction rules.
pub mod event_types {
    pub const CREATE: &str = "m.room.create";
    pub const MEMBER: &str = "m.room.member";
    pub const JOIN_RULES: &str = "m.room.join_rules";
    pub const POWER_LEVELS: &str = "m.room.power_levels";
    pub const ALIASES: &str = "m.room.aliases";
    pub const REDACTION: &str = "m.room.redaction";
    pub const MESSAGE: &str = "m.room.message";
}
