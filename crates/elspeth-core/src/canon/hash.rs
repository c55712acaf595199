//! SHA-256 content hashing over canonical JSON.

use super::json::{canonical_json, CanonError};
use sha2::{Digest, Sha256};
use serde_json::Value;

/// Hashes raw bytes and returns lowercase hex.
pub fn stable_hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hashes raw bytes and returns lowercase hex (HMAC variant used by
/// [`crate::fingerprint`] for keyed digests).
pub(crate) fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Canonicalizes `value` and returns the SHA-256 hex digest of the result.
///
/// Inline payloads and blob-store payloads with identical content always
/// hash to the same value, since both paths route through this function.
pub fn stable_hash(value: &Value) -> Result<String, CanonError> {
    let bytes = canonical_json(value)?;
    Ok(stable_hash_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_content_same_hash_regardless_of_key_order() {
        let a = stable_hash(&json!({"a": 1, "b": 2})).unwrap();
        let b = stable_hash(&json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_is_64_hex_chars() {
        let h = stable_hash(&json!({"x": 1})).unwrap();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
