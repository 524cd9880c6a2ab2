//! Content hashes, reference hashes and Ed25519 signatures for `V1` events.
//!
//! Every digest and signature is computed over canonical JSON and encoded as
//! unpadded standard base64.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::canonical::encode_canonical_map;
use crate::error::EventError;
use crate::event::{Event, Signatures};
use crate::projection::{redact_pdu, V1RedactionRules};

/// Name of the only hash algorithm in use.
pub const SHA256: &str = "sha256";

/// SHA-256 over the canonical JSON of `dict` without `signatures`,
/// `unsigned` and `hashes`.
fn content_hash_of(dict: &Map<String, Value>) -> Result<[u8; 32], EventError> {
    let mut dict = dict.clone();
    dict.remove("signatures");
    dict.remove("unsigned");
    dict.remove("hashes");
    Ok(Sha256::digest(encode_canonical_map(&dict)?.as_bytes()).into())
}

/// The canonical JSON that signatures and reference hashes cover: the
/// redacted form of `dict` without `signatures` and `unsigned`.
fn redacted_payload(dict: &Map<String, Value>) -> Result<String, EventError> {
    let mut redacted = redact_pdu(dict, &V1RedactionRules);
    redacted.remove("signatures");
    redacted.remove("unsigned");
    Ok(encode_canonical_map(&redacted)?)
}

fn signature_of(
    dict: &Map<String, Value>,
    server_name: &str,
    key_id: &str,
    signing_key: &SigningKey,
) -> Result<Signatures, EventError> {
    let payload = redacted_payload(dict)?;
    let signature = signing_key.sign(payload.as_bytes());

    let mut signatures = Signatures::new();
    signatures
        .entry(server_name.to_string())
        .or_default()
        .insert(key_id.to_string(), STANDARD_NO_PAD.encode(signature.to_bytes()));
    Ok(signatures)
}

/// Computes the content hash of `event`.
pub fn compute_content_hash(event: &Event) -> Result<(&'static str, [u8; 32]), EventError> {
    Ok((SHA256, content_hash_of(&event.get_dict()?)?))
}

/// Checks the event's `hashes.sha256` against its content.
///
/// A missing or undecodable hash counts as a mismatch.
pub fn check_event_content_hash(event: &Event) -> Result<bool, EventError> {
    let (name, expected) = compute_content_hash(event)?;
    let Some(encoded) = event.hashes().get(name) else {
        tracing::debug!(
            event_id = event.event_id().unwrap_or("<none>"),
            "event has no {name} content hash"
        );
        return Ok(false);
    };
    match decode_base64(encoded) {
        Some(actual) => Ok(actual == expected),
        None => {
            tracing::debug!(
                event_id = event.event_id().unwrap_or("<none>"),
                "content hash is not valid base64"
            );
            Ok(false)
        }
    }
}

/// Computes the reference hash of `event`: SHA-256 over its redacted form.
pub fn compute_event_reference_hash(event: &Event) -> Result<(&'static str, [u8; 32]), EventError> {
    let payload = redacted_payload(&event.get_dict()?)?;
    Ok((SHA256, Sha256::digest(payload.as_bytes()).into()))
}

/// Signs the redacted form of `event`, returning
/// `{server_name: {key_id: signature}}`.
pub fn compute_event_signature(
    event: &Event,
    server_name: &str,
    key_id: &str,
    signing_key: &SigningKey,
) -> Result<Signatures, EventError> {
    signature_of(&event.get_dict()?, server_name, key_id, signing_key)
}

/// Signs `event` and attaches the signature, keeping any others.
pub fn sign_event(
    event: &Event,
    server_name: &str,
    key_id: &str,
    signing_key: &SigningKey,
) -> Result<(), EventError> {
    let signature = compute_event_signature(event, server_name, key_id, signing_key)?;
    event.add_signatures(signature);
    tracing::debug!(
        event_id = event.event_id().unwrap_or("<none>"),
        server_name,
        key_id,
        "signed event"
    );
    Ok(())
}

/// Verifies the signature `server_name` made on `event` with `key_id`.
///
/// # Errors
///
/// `EventError::MissingSignature` if there is no such signature,
/// `EventError::InvalidSignature` if it does not verify.
pub fn verify_event_signature(
    event: &Event,
    server_name: &str,
    key_id: &str,
    verifying_key: &VerifyingKey,
) -> Result<(), EventError> {
    let signatures = event.signatures();
    let encoded = signatures
        .get(server_name)
        .and_then(|keys| keys.get(key_id))
        .ok_or_else(|| EventError::MissingSignature {
            server_name: server_name.to_string(),
            key_id: key_id.to_string(),
        })?;

    let bytes = decode_base64(encoded)
        .ok_or_else(|| EventError::InvalidSignature("signature is not valid base64".to_string()))?;
    let signature = Signature::from_slice(&bytes)
        .map_err(|e| EventError::InvalidSignature(e.to_string()))?;

    let payload = redacted_payload(&event.get_dict()?)?;
    verifying_key
        .verify(payload.as_bytes(), &signature)
        .map_err(|e| EventError::InvalidSignature(e.to_string()))
}

/// Fills in `hashes.sha256` and replaces `signatures` on a raw event mapping
/// before it is constructed.
pub fn add_hashes_and_signatures(
    raw: &mut Map<String, Value>,
    server_name: &str,
    key_id: &str,
    signing_key: &SigningKey,
) -> Result<(), EventError> {
    let digest = content_hash_of(raw)?;

    let hashes = raw
        .entry("hashes")
        .or_insert_with(|| Value::Object(Map::new()));
    match hashes {
        Value::Object(hashes) => {
            hashes.insert(SHA256.to_string(), Value::String(STANDARD_NO_PAD.encode(digest)));
        }
        other => {
            return Err(EventError::malformed(
                "hashes",
                format!("expected an object, got {other}"),
            ))
        }
    }

    let signatures = signature_of(raw, server_name, key_id, signing_key)?;
    raw.insert("signatures".to_string(), serde_json::to_value(signatures)?);
    Ok(())
}

/// Accepts both padded and unpadded standard base64.
fn decode_base64(encoded: &str) -> Option<Vec<u8>> {
    STANDARD_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventConfig, EventParts};
    use crate::v1::construct_v1;
    use serde_json::json;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn raw_message() -> Map<String, Value> {
        match json!({
            "event_id": "$msg:origin.test",
            "type": "m.room.message",
            "room_id": "!room:origin.test",
            "sender": "@bob:origin.test",
            "depth": 5,
            "origin": "origin.test",
            "origin_server_ts": 1_700_000_000_000_i64,
            "prev_events": [["$prev:origin.test", {}]],
            "auth_events": [],
            "content": {"body": "hello", "msgtype": "m.text"},
            "unsigned": {"age_ts": 1},
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn build(raw: Map<String, Value>) -> Event {
        construct_v1(EventParts::new(raw), &EventConfig::default()).unwrap()
    }

    #[test]
    fn hashed_and_signed_mapping_verifies() {
        let mut raw = raw_message();
        add_hashes_and_signatures(&mut raw, "origin.test", "ed25519:a", &key()).unwrap();
        let event = build(raw);

        assert!(check_event_content_hash(&event).unwrap());
        assert!(event.is_signed());
        verify_event_signature(&event, "origin.test", "ed25519:a", &key().verifying_key()).unwrap();
    }

    #[test]
    fn tampered_content_fails_hash_but_keeps_signature() {
        let mut raw = raw_message();
        add_hashes_and_signatures(&mut raw, "origin.test", "ed25519:a", &key()).unwrap();
        raw.insert("content".to_string(), json!({"body": "tampered", "msgtype": "m.text"}));
        let event = build(raw);

        assert!(!check_event_content_hash(&event).unwrap());
        // signatures cover the redacted form, which has no message body
        verify_event_signature(&event, "origin.test", "ed25519:a", &key().verifying_key()).unwrap();
    }

    #[test]
    fn missing_or_garbled_hash_is_a_mismatch() {
        let event = build(raw_message());
        assert!(!check_event_content_hash(&event).unwrap());

        let mut raw = raw_message();
        raw.insert("hashes".to_string(), json!({"sha256": "!!not base64!!"}));
        assert!(!check_event_content_hash(&build(raw)).unwrap());
    }

    #[test]
    fn padded_hash_is_accepted() {
        let event = build(raw_message());
        let (_, digest) = compute_content_hash(&event).unwrap();
        let padded = base64::engine::general_purpose::STANDARD.encode(digest);
        assert!(padded.ends_with('='));

        let mut raw = raw_message();
        raw.insert("hashes".to_string(), json!({"sha256": padded}));
        assert!(check_event_content_hash(&build(raw)).unwrap());
    }

    #[test]
    fn content_hash_ignores_signatures_and_unsigned() {
        let plain = build(raw_message());
        let mut raw = raw_message();
        raw.insert("signatures".to_string(), json!({"x": {"ed25519:1": "sig"}}));
        raw.insert("unsigned".to_string(), json!({"age_ts": 99}));
        let decorated = build(raw);

        assert_eq!(
            compute_content_hash(&plain).unwrap(),
            compute_content_hash(&decorated).unwrap()
        );
    }

    #[test]
    fn reference_hash_ignores_redactable_content() {
        let a = build(raw_message());
        let mut raw = raw_message();
        raw.insert("content".to_string(), json!({"body": "other"}));
        let b = build(raw);

        let (name, digest) = compute_event_reference_hash(&a).unwrap();
        assert_eq!(name, "sha256");
        assert_eq!(digest, compute_event_reference_hash(&b).unwrap().1);
        assert_ne!(
            compute_content_hash(&a).unwrap().1,
            compute_content_hash(&b).unwrap().1
        );
    }

    #[test]
    fn sign_event_adds_to_existing_signatures() {
        let mut raw = raw_message();
        raw.insert("signatures".to_string(), json!({"other.test": {"ed25519:z": "sig"}}));
        let event = build(raw);

        sign_event(&event, "origin.test", "ed25519:a", &key()).unwrap();

        let signatures = event.signatures();
        assert_eq!(signatures.len(), 2);
        assert!(signatures["other.test"].contains_key("ed25519:z"));
        verify_event_signature(&event, "origin.test", "ed25519:a", &key().verifying_key()).unwrap();
    }

    #[test]
    fn verification_errors() {
        let event = build(raw_message());
        assert!(matches!(
            verify_event_signature(&event, "origin.test", "ed25519:a", &key().verifying_key()),
            Err(EventError::MissingSignature { .. })
        ));

        sign_event(&event, "origin.test", "ed25519:a", &key()).unwrap();
        let other = SigningKey::from_bytes(&[9u8; 32]);
        assert!(matches!(
            verify_event_signature(&event, "origin.test", "ed25519:a", &other.verifying_key()),
            Err(EventError::InvalidSignature(_))
        ));
    }

    #[test]
    fn signing_does_not_change_canonical_json() {
        let event = build(raw_message());
        let before = event.canonical_json().to_string();
        sign_event(&event, "origin.test", "ed25519:a", &key()).unwrap();
        assert_eq!(event.canonical_json(), before);
    }
}
