//! Canonical JSON and content hashing.
//!
//! Every recorder call routes its payloads through this module before they
//! are written to the audit store, so that replaying a run years later
//! reproduces the exact same hashes it produced at write time.

mod json;
mod hash;

pub use hash::{stable_hash, stable_hash_bytes};
pub(crate) use hash::hmac_sha256_hex;
pub use json::{canonical_json, canonical_json_string, CanonError};
