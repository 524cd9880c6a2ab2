//! Immutable, format-versioned room events for the Trellis homeserver.
//!
//! Every other subsystem builds on the [`Event`] defined here:
//!
//! - [`canonical`] encodes JSON deterministically for hashing and signing.
//! - [`FormatRegistry`] maps room versions to event formats and event formats
//!   to constructors, so callers never branch on a format themselves.
//! - [`InternalMetadata`] holds local-only flags that are never signed or
//!   sent to other servers.
//! - [`Event::get_pdu_json`] is the outbound projection, reduced through
//!   [`RedactionRules`] when the event has been redacted.
//! - [`signing`] computes content hashes, reference hashes and signatures.
//!
//! Content fields are fixed when an event is constructed. Signatures,
//! `unsigned` annotations and internal metadata may be replaced afterwards,
//! always as a whole container.

pub mod canonical;
pub mod error;
pub mod event;
pub mod format;
pub mod metadata;
pub mod projection;
pub mod signing;
pub mod v1;

pub use canonical::{encode_canonical, encode_canonical_map};
pub use error::{CanonicalJsonError, EventError};
pub use event::{Event, EventConfig, EventParts, Hashes, Signatures};
pub use format::{builtin_constructor, EventConstructor, FormatRegistry};
pub use metadata::InternalMetadata;
pub use projection::{prune_event, prune_event_with_rules, redact_pdu, RedactionRules, V1RedactionRules};
pub use signing::{
    add_hashes_and_signatures, check_event_content_hash, compute_content_hash,
    compute_event_reference_hash, compute_event_signature, sign_event, verify_event_signature,
};
pub use trellis_types::{EventFormatVersion, RoomVersion};
