//! Event storage for the Trellis homeserver.
//!
//! Persists events into the tables created by `trellis-db` and rebuilds them
//! through a [`FormatRegistry`](trellis_events::FormatRegistry). The stored
//! canonical JSON is reused as the event's precomputed canonical form, so an
//! event hashes and verifies identically before and after a round trip
//! through storage.
//!
//! DAG edges are kept in `event_edges` (prev events) and `event_auth` (auth
//! events) with an explicit ordinal, so the order an event listed its
//! references in survives storage.

mod error;
mod store;

pub use error::StoreError;
pub use store::{
    get_auth_event_ids, get_event, get_forward_extremities, get_min_depth, get_prev_event_ids,
    get_room_events, persist_event, set_rejected, update_internal_metadata, update_signatures,
    update_unsigned,
};
