//! Error types for the event store.

use trellis_events::EventError;

/// Errors that can occur while persisting or loading events.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored JSON column could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored event could not be rebuilt.
    #[error("stored event is invalid: {0}")]
    Event(#[from] EventError),

    /// Events are keyed by ID; one without an ID cannot be stored.
    #[error("event has no event_id")]
    MissingEventId,
}
