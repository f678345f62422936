//! Deterministic payload canonicalization
//!
//! Independent implementations must sign and verify identical bytes, so the
//! canonical form is key-sorted, compact JSON with any `signature` /
//! `signatureMetadata` fields stripped at every nesting level.

use crate::{CryptoError, CryptoResult};
use serde_json::{Map, Value};

/// Fields that never participate in the signed message
const STRIPPED_FIELDS: [&str; 2] = ["signature", "signatureMetadata"];

/// Produce the canonical form of a payload: objects key-sorted recursively,
/// signature fields dropped.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !STRIPPED_FIELDS.contains(&k.as_str()))
                .collect();
            keys.sort();

            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical compact-JSON bytes of a payload
pub fn canonical_bytes(value: &Value) -> CryptoResult<Vec<u8>> {
    serde_json::to_vec(&canonicalize(value)).map_err(|e| CryptoError::Canonicalization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_is_irrelevant() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn test_signature_fields_stripped() {
        let with_sig = json!({
            "amount": 10.0,
            "signature": "deadbeef",
            "nested": {"signatureMetadata": {"keyId": "k"}, "value": 1}
        });
        let without = json!({"amount": 10.0, "nested": {"value": 1}});
        assert_eq!(
            canonical_bytes(&with_sig).unwrap(),
            canonical_bytes(&without).unwrap()
        );
    }

    #[test]
    fn test_compact_encoding() {
        let value = json!({"a": [1, 2], "b": "x"});
        let bytes = canonical_bytes(&value).unwrap();
        assert_eq!(bytes, br#"{"a":[1,2],"b":"x"}"#.to_vec());
    }

    #[test]
    fn test_arrays_keep_order() {
        let a = json!([3, 1, 2]);
        let bytes = canonical_bytes(&a).unwrap();
        assert_eq!(bytes, b"[3,1,2]".to_vec());
    }

    #[test]
    fn test_scalars_untouched() {
        assert_eq!(canonical_bytes(&json!(null)).unwrap(), b"null".to_vec());
        assert_eq!(canonical_bytes(&json!(true)).unwrap(), b"true".to_vec());
        assert_eq!(canonical_bytes(&json!(1.5)).unwrap(), b"1.5".to_vec());
    }
}
