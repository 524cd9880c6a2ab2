//! Canonical JSON encoder.
//!
//! Canonical rules:
//! - object keys sorted by UTF-8 byte order, at every level
//! - no insignificant whitespace
//! - strings emitted as UTF-8, escaping only what JSON requires
//! - integers must lie in `[-(2^53)+1, 2^53-1]`
//! - other numbers use their shortest round-trip decimal form
//!
//! The output is the exact byte input to content hashing and signing. This
//! module performs neither.

use serde_json::{Map, Value};

use crate::error::CanonicalJsonError;

/// Largest integer that survives a round trip through an IEEE double.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Smallest integer that survives a round trip through an IEEE double.
pub const MIN_SAFE_INTEGER: i64 = -MAX_SAFE_INTEGER;

/// Encodes a JSON value as a canonical JSON string.
pub fn encode_canonical(value: &Value) -> Result<String, CanonicalJsonError> {
    let mut out = String::new();
    let mut path = String::from("$");
    write_value(&mut out, value, &mut path)?;
    Ok(out)
}

/// Encodes a JSON object as a canonical JSON string.
pub fn encode_canonical_map(map: &Map<String, Value>) -> Result<String, CanonicalJsonError> {
    let mut out = String::new();
    let mut path = String::from("$");
    write_object(&mut out, map, &mut path)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value, path: &mut String) -> Result<(), CanonicalJsonError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                if !(MIN_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i) {
                    return Err(CanonicalJsonError::IntegerOutOfRange {
                        path: path.clone(),
                        value: n.to_string(),
                    });
                }
                out.push_str(&i.to_string());
            } else if n.is_u64() {
                return Err(CanonicalJsonError::IntegerOutOfRange {
                    path: path.clone(),
                    value: n.to_string(),
                });
            } else {
                // serde_json only holds finite doubles; Display is ryu's shortest form.
                out.push_str(&n.to_string());
            }
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let len = path.len();
                path.push_str(&format!("[{i}]"));
                write_value(out, item, path)?;
                path.truncate(len);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map, path)?,
    }
    Ok(())
}

fn write_object(
    out: &mut String,
    map: &Map<String, Value>,
    path: &mut String,
) -> Result<(), CanonicalJsonError> {
    // `Map` iteration order depends on serde_json's `preserve_order` feature,
    // which any crate in the build graph may switch on. Sort explicitly.
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        let len = path.len();
        path.push('.');
        path.push_str(key);
        write_value(out, value, path)?;
        path.truncate(len);
    }
    out.push('}');
    Ok(())
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn sorts_keys_recursively() {
        let value = json!({
            "b": 1,
            "a": {
                "d": 4,
                "c": 3
            },
            "aa": [
                {"z": 1, "y": 2}
            ]
        });

        let encoded = encode_canonical(&value).unwrap();
        assert_eq!(encoded, r#"{"a":{"c":3,"d":4},"aa":[{"y":2,"z":1}],"b":1}"#);
    }

    #[test]
    fn is_deterministic_for_hashmap() {
        let mut map_a = HashMap::new();
        map_a.insert("b".to_string(), 2u32);
        map_a.insert("a".to_string(), 1u32);

        let mut map_b = HashMap::new();
        map_b.insert("a".to_string(), 1u32);
        map_b.insert("b".to_string(), 2u32);

        let value_a = serde_json::to_value(&map_a).unwrap();
        let value_b = serde_json::to_value(&map_b).unwrap();
        assert_eq!(
            encode_canonical(&value_a).unwrap(),
            encode_canonical(&value_b).unwrap()
        );
    }

    #[test]
    fn emits_utf8_without_ascii_escaping() {
        let value = json!({"body": "caf\u{e9} \u{1f600}", "q": "a\"b\\c\n"});
        let encoded = encode_canonical(&value).unwrap();
        assert_eq!(encoded, "{\"body\":\"caf\u{e9} \u{1f600}\",\"q\":\"a\\\"b\\\\c\\n\"}");
    }

    #[test]
    fn escapes_control_characters_in_lowercase_hex() {
        let value = json!("\u{01}\u{1f}");
        assert_eq!(encode_canonical(&value).unwrap(), "\"\\u0001\\u001f\"");
    }

    #[test]
    fn floats_use_shortest_round_trip_form() {
        let value = json!({"content": {"ratio": 0.5, "whole": 2.0, "tiny": 1e-7, "big": 1.5e300}});
        let encoded = encode_canonical(&value).unwrap();
        assert_eq!(
            encoded,
            r#"{"content":{"big":1.5e300,"ratio":0.5,"tiny":1e-7,"whole":2.0}}"#
        );

        let reparsed: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(encode_canonical(&reparsed).unwrap(), encoded);
    }

    #[test]
    fn out_of_range_integer_reports_path() {
        let value = json!({"content": {"count": u64::MAX}});
        match encode_canonical(&value).unwrap_err() {
            CanonicalJsonError::IntegerOutOfRange { path, .. } => {
                assert_eq!(path, "$.content.count")
            }
        }
    }

    #[test]
    fn rejects_integers_outside_safe_range() {
        assert!(encode_canonical(&json!(MAX_SAFE_INTEGER)).is_ok());
        assert!(encode_canonical(&json!(MIN_SAFE_INTEGER)).is_ok());
        assert!(matches!(
            encode_canonical(&json!([MAX_SAFE_INTEGER + 1])),
            Err(CanonicalJsonError::IntegerOutOfRange { ref path, .. }) if path == "$[0]"
        ));
        assert!(matches!(
            encode_canonical(&json!(u64::MAX)),
            Err(CanonicalJsonError::IntegerOutOfRange { .. })
        ));
    }

    #[test]
    fn literals_and_empty_containers() {
        let value = json!({"n": null, "t": true, "f": false, "o": {}, "l": []});
        assert_eq!(
            encode_canonical(&value).unwrap(),
            r#"{"f":false,"l":[],"n":null,"o":{},"t":true}"#
        );
    }
}
