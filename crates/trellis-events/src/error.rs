//! Error types for event construction and projection.

/// Errors raised while encoding a value as canonical JSON.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalJsonError {
    /// Integers must fit in the interoperable range `[-(2^53)+1, 2^53-1]`.
    #[error("integer {value} at {path} is outside the canonical JSON range")]
    IntegerOutOfRange { path: String, value: String },
}

/// Errors that can occur while building, reading or signing events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The room version is not in the known set.
    #[error("unknown room version: {0}")]
    UnknownRoomVersion(String),

    /// No constructor is registered for the event format.
    #[error("unknown event format version: {0}")]
    UnknownFormatVersion(i64),

    /// The event could not be canonically encoded.
    #[error("event cannot be canonicalized: {0}")]
    Canonical(#[from] CanonicalJsonError),

    /// A field is present but has the wrong shape.
    #[error("malformed event field `{field}`: {reason}")]
    Malformed { field: &'static str, reason: String },

    /// An optional field was accessed on an event that does not carry it.
    #[error("event has no `{0}` field")]
    MissingField(&'static str),

    /// Content replacement was attempted on an event built in frozen mode.
    #[error("event {0} is frozen; its content cannot be replaced")]
    Frozen(String),

    /// The cached canonical JSON could not be decoded.
    #[error("event JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The event carries no signature for the requested server and key.
    #[error("no signature from {server_name} with key {key_id}")]
    MissingSignature { server_name: String, key_id: String },

    /// A signature was present but did not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

impl EventError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field,
            reason: reason.into(),
        }
    }
}
