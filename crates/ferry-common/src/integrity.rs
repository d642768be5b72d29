//! Chunk integrity codec
//!
//! Canonical serialization, checksums, and chunk identity. The canonical form
//! is compact JSON with object keys sorted at every depth, so two record
//! sequences that are equal as mappings always hash identically regardless of
//! field insertion order. Numbers keep serde_json's representation: integers as
//! integers, anything with a fractional part or exponent as a shortest
//! round-trip `f64`.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{FerryError, Result};
use crate::protocol::Record;

/// Canonical bytes of a record sequence (a JSON array of objects)
pub fn canonicalize(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * 64);
    out.push(b'[');
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_object(&mut out, record);
    }
    out.push(b']');
    out
}

/// Canonical bytes of a single record
pub fn canonical_record(record: &Record) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(&mut out, record);
    out
}

/// Length of [`canonical_record`], counted without allocating the bytes
pub fn canonical_record_len(record: &Record) -> usize {
    let mut count = ByteCount(0);
    write_object(&mut count, record);
    count.0
}

/// Hex SHA-256 of the canonical serialization
pub fn checksum(records: &[Record]) -> String {
    hex::encode(Sha256::digest(canonicalize(records)))
}

/// Verify records against a declared checksum
pub fn verify(records: &[Record], expected: &str) -> Result<()> {
    let actual = checksum(records);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(FerryError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Globally unique, deterministic chunk identity
pub fn chunk_id(ingestion_id: &str, chunk_number: i64) -> String {
    format!("{}:{}", ingestion_id, chunk_number)
}

/// Destination of canonical bytes
trait Sink {
    fn put(&mut self, bytes: &[u8]);
}

impl Sink for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

struct ByteCount(usize);

impl Sink for ByteCount {
    fn put(&mut self, bytes: &[u8]) {
        self.0 += bytes.len();
    }
}

fn write_value(out: &mut impl Sink, value: &Value) {
    match value {
        Value::Null => out.put(b"null"),
        Value::Bool(true) => out.put(b"true"),
        Value::Bool(false) => out.put(b"false"),
        Value::Number(n) => out.put(n.to_string().as_bytes()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.put(b"[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.put(b",");
                }
                write_value(out, item);
            }
            out.put(b"]");
        },
        Value::Object(map) => write_object(out, map),
    }
}

fn write_object(out: &mut impl Sink, map: &Record) {
    // serde_json::Map ordering depends on crate features; sort explicitly
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    out.put(b"{");
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.put(b",");
        }
        write_string(out, key);
        out.put(b":");
        write_value(out, value);
    }
    out.put(b"}");
}

fn write_string(out: &mut impl Sink, s: &str) {
    out.put(b"\"");
    for ch in s.chars() {
        match ch {
            '"' => out.put(b"\\\""),
            '\\' => out.put(b"\\\\"),
            '\n' => out.put(b"\\n"),
            '\r' => out.put(b"\\r"),
            '\t' => out.put(b"\\t"),
            '\u{08}' => out.put(b"\\b"),
            '\u{0c}' => out.put(b"\\f"),
            c if (c as u32) < 0x20 => {
                out.put(format!("\\u{:04x}", c as u32).as_bytes());
            },
            c => {
                let mut buf = [0u8; 4];
                out.put(c.encode_utf8(&mut buf).as_bytes());
            },
        }
    }
    out.put(b"\"");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_canonical_form_sorts_keys() {
        let records = vec![record(json!({"b": 2, "a": {"z": true, "y": null}}))];
        assert_eq!(canonicalize(&records), br#"[{"a":{"y":null,"z":true},"b":2}]"#.to_vec());
    }

    #[test]
    fn test_canonical_form_matches_serde_json_escaping() {
        let text = "quote\" slash\\ tab\t bell\u{07} snow\u{2603}";
        let records = vec![record(json!({ "s": text }))];
        let expected = format!("[{{\"s\":{}}}]", serde_json::to_string(text).unwrap());
        assert_eq!(String::from_utf8(canonicalize(&records)).unwrap(), expected);
    }

    #[test]
    fn test_decimals_are_floats() {
        let parsed: Value = serde_json::from_str(r#"{"price": 10.50, "qty": 3}"#).unwrap();
        let records = vec![record(parsed)];
        assert_eq!(canonicalize(&records), br#"[{"price":10.5,"qty":3}]"#.to_vec());
    }

    #[test]
    fn test_empty_sequence_checksum() {
        // sha256("[]")
        assert_eq!(
            checksum(&[]),
            "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
        );
    }

    #[test]
    fn test_checksum_detects_value_change() {
        let a = vec![record(json!({"sku": "A", "qty": 1}))];
        let b = vec![record(json!({"sku": "A", "qty": 2}))];
        assert_ne!(checksum(&a), checksum(&b));
    }

    #[test]
    fn test_checksum_detects_reordered_records() {
        let a = vec![record(json!({"n": 1})), record(json!({"n": 2}))];
        let b = vec![record(json!({"n": 2})), record(json!({"n": 1}))];
        assert_ne!(checksum(&a), checksum(&b));
    }

    #[test]
    fn test_verify() {
        let records = vec![record(json!({"n": 1}))];
        let sum = checksum(&records);
        assert!(verify(&records, &sum).is_ok());
        assert!(verify(&records, &sum.to_uppercase()).is_ok());
        assert!(matches!(
            verify(&records, "deadbeef"),
            Err(FerryError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("abc", 7), "abc:7");
    }

    #[test]
    fn test_record_len_matches_canonical_bytes() {
        let r = record(json!({"name": "widget", "price": 1.25}));
        assert_eq!(canonical_record_len(&r), canonical_record(&r).len());
        assert_eq!(canonicalize(&[r.clone()]).len(), canonical_record_len(&r) + 2);

        // Escapes and multi-byte characters count as written
        let r = record(json!({"s": "tab\t snow\u{2603} nul\u{0}", "n": [1, null, {"b": false}]}));
        assert_eq!(canonical_record_len(&r), canonical_record(&r).len());
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-1.0e9f64..1.0e9).prop_map(|f| json!(f)),
            "[a-zA-Z0-9 _\\-]{0,12}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn prop_checksum_ignores_field_insertion_order(
            fields in proptest::collection::btree_map("[a-z]{1,6}", scalar(), 0..8),
            copies in 1usize..4,
        ) {
            let forward: Record = fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let reversed: Record = fields.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();

            let a = vec![forward; copies];
            let b = vec![reversed; copies];

            prop_assert_eq!(checksum(&a), checksum(&b));
            prop_assert_eq!(checksum(&a), checksum(&a));
        }
    }
}
