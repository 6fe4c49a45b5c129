//! # Hashing Utilities
//!
//! Every digest in the ledger comes out of this module. There is exactly one
//! way to hash a block and exactly one way to hash a stored value, and both
//! go through [`canonical_json`] first.
//!
//! ## Canonical form
//!
//! A value is canonicalized by converting it into a `serde_json::Value` and
//! serializing that compactly. `serde_json`'s object map is a `BTreeMap`, so
//! keys come out sorted no matter how the original struct or map ordered
//! them. Two values that are equal as JSON therefore always hash the same.
//!
//! Digests are recomputed from JSON read back off disk, so every float must
//! survive a print/parse cycle bit for bit. The workspace enables
//! `serde_json`'s `float_roundtrip` feature for exactly that.
//!
//! ## Block linkage
//!
//! ```text
//! block_hash = SHA-256( prev_hash || canonical_json(data) )
//! ```
//!
//! Ids and timestamps are deliberately outside the digest: re-appending the
//! same data on top of the same predecessor yields the same hash.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Errors raised while canonicalizing a value.
#[derive(Debug, thiserror::Error)]
#[error("value is not representable as canonical JSON: {0}")]
pub struct CanonicalError(#[from] serde_json::Error);

/// Serialize `value` into its canonical JSON bytes (sorted keys, compact).
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Compute the SHA-256 hash of raw bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Content hash of a serializable value, hex-encoded.
///
/// Used by the storage layer to attest a record's logical (pre-encryption)
/// value.
pub fn hash_value<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let bytes = canonical_json(value)?;
    Ok(hex::encode(sha256(&bytes)))
}

/// Block hash: digest over the predecessor's hash followed by the canonical
/// form of the block payload, hex-encoded.
pub fn hash_link<T: Serialize + ?Sized>(prev: &str, data: &T) -> Result<String, CanonicalError> {
    let payload = canonical_json(data)?;
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    hasher.update(&payload);
    Ok(hex::encode(hasher.finalize()))
}

/// True if `s` looks like a hex digest produced by this module.
pub fn is_digest(s: &str) -> bool {
    s.len() == crate::config::HASH_OUTPUT_LENGTH * 2
        && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let bytes = canonical_json(&json!({"b": 1, "a": {"d": 2, "c": 3}})).unwrap();
        assert_eq!(bytes, br#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn hash_ignores_map_insertion_order() {
        let mut forward = HashMap::new();
        forward.insert("unit", json!("m/s"));
        forward.insert("value", json!(13.5));

        let reverse = json!({"value": 13.5, "unit": "m/s"});
        assert_eq!(hash_value(&forward).unwrap(), hash_value(&reverse).unwrap());
    }

    #[test]
    fn hash_link_depends_on_prev() {
        let data = json!({"value": 1});
        let a = hash_link("0", &data).unwrap();
        let b = hash_link("1", &data).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hash_link_is_prev_then_payload() {
        let data = json!({});
        let expected = hex::encode(sha256(b"0{}"));
        assert_eq!(hash_link("0", &data).unwrap(), expected);
    }

    #[test]
    fn digest_shape() {
        let h = hash_value(&json!(null)).unwrap();
        assert!(is_digest(&h));
        assert!(!is_digest("0"));
        assert!(!is_digest(&h.to_uppercase()));
    }

    #[test]
    fn float_digests_survive_reparse() {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut checked = 0;
        while checked < 5_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let v = f64::from_bits(state);
            if !v.is_finite() {
                continue;
            }
            let original = json!({ "v": v });
            let bytes = canonical_json(&original).unwrap();
            let reparsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(reparsed["v"].as_f64().unwrap().to_bits(), v.to_bits(), "{v:e}");
            assert_eq!(hash_link("0", &reparsed).unwrap(), hash_link("0", &original).unwrap());
            checked += 1;
        }
    }
}
