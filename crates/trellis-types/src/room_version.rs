//! Room version identifiers.

use serde::Serialize;

use crate::EventFormatVersion;

/// A room version known to this server.
///
/// Room versions are negotiated per room and select both the event format
/// and the authorization semantics. Only the event format is relevant to
/// this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RoomVersion {
    /// The identifier as it appears on the wire, e.g. `"1"`.
    pub identifier: &'static str,
    /// The event format used by rooms of this version.
    pub event_format: EventFormatVersion,
}

impl RoomVersion {
    pub const V1: RoomVersion = RoomVersion {
        identifier: "1",
        event_format: EventFormatVersion::V1,
    };

    pub const V2: RoomVersion = RoomVersion {
        identifier: "2",
        event_format: EventFormatVersion::V1,
    };

    pub const STATE_V2_TEST: RoomVersion = RoomVersion {
        identifier: "state-v2-test",
        event_format: EventFormatVersion::V1,
    };

    pub const VDH_TEST: RoomVersion = RoomVersion {
        identifier: "vdh-test-version",
        event_format: EventFormatVersion::V1,
    };
}

/// All room versions this server can participate in.
pub const KNOWN_ROOM_VERSIONS: &[RoomVersion] = &[
    RoomVersion::V1,
    RoomVersion::V2,
    RoomVersion::STATE_V2_TEST,
    RoomVersion::VDH_TEST,
];

/// The room version used for newly created rooms.
pub const DEFAULT_ROOM_VERSION: RoomVersion = RoomVersion::V1;
