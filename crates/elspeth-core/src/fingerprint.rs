//! Secret fingerprinting for config intake (§6).
//!
//! Any configuration field whose key matches `api_key|token|password|secret`
//! (case-insensitive) or ends in `_key`/`_token`/`_secret` is replaced by an
//! HMAC-SHA256 fingerprint of its canonicalized value; the raw value is
//! never persisted. The key is read once from `ELSPETH_FINGERPRINT_KEY`,
//! mirroring this workspace's `DbConfig::from_env` one-time env load.

use crate::canon::{canonical_json, hmac_sha256_hex};
use crate::errors::EngineError;
use once_cell::sync::OnceCell;
use serde_json::Value;

static FINGERPRINT_KEY: OnceCell<Option<Vec<u8>>> = OnceCell::new();

const SECRET_NAMES: &[&str] = &["api_key", "token", "password", "secret"];
const SECRET_SUFFIXES: &[&str] = &["_key", "_token", "_secret"];

fn is_secret_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SECRET_NAMES.contains(&lower.as_str()) || SECRET_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

fn load_key() -> Option<Vec<u8>> {
    dotenvy::dotenv().ok();
    std::env::var("ELSPETH_FINGERPRINT_KEY").ok().map(String::into_bytes)
}

fn fingerprint_key() -> &'static Option<Vec<u8>> {
    FINGERPRINT_KEY.get_or_init(load_key)
}

/// Walks `config` and replaces every secret-shaped field's value with its
/// HMAC-SHA256 fingerprint. Fails if a secret field exists but no
/// `ELSPETH_FINGERPRINT_KEY` is configured.
pub fn fingerprint_config(config: &Value) -> Result<Value, EngineError> {
    fingerprint_value(config, false)
}

fn fingerprint_value(value: &Value, parent_is_secret: bool) -> Result<Value, EngineError> {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let secret = is_secret_field(k);
                let replaced = if secret { fingerprint_leaf(v)? } else { fingerprint_value(v, false)? };
                out.insert(k.clone(), replaced);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(fingerprint_value(item, parent_is_secret)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

fn fingerprint_leaf(value: &Value) -> Result<Value, EngineError> {
    let key = fingerprint_key()
        .as_ref()
        .ok_or_else(|| EngineError::Validation("ELSPETH_FINGERPRINT_KEY is required to fingerprint secret config fields".into()))?;
    let bytes = canonical_json(value)?;
    Ok(Value::String(hmac_sha256_hex(key, &bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_key<T>(key: &str, f: impl FnOnce() -> T) -> T {
        std::env::set_var("ELSPETH_FINGERPRINT_KEY", key);
        FINGERPRINT_KEY.get_or_init(|| Some(key.as_bytes().to_vec()));
        f()
    }

    #[test]
    fn fingerprints_secret_shaped_fields() {
        with_key("test-key", || {
            let config = json!({"api_key": "sk-123", "name": "demo", "timeout_ms": 30});
            let fingerprinted = fingerprint_config(&config).unwrap();
            assert_ne!(fingerprinted["api_key"], json!("sk-123"));
            assert_eq!(fingerprinted["name"], json!("demo"));
            assert_eq!(fingerprinted["timeout_ms"], json!(30));
        });
    }

    #[test]
    fn suffix_match_catches_custom_secret_fields() {
        with_key("test-key", || {
            let config = json!({"db_password": "hunter2", "webhook_secret": "shh"});
            let fingerprinted = fingerprint_config(&config).unwrap();
            assert!(fingerprinted["db_password"].as_str().unwrap().len() == 64);
            assert!(fingerprinted["webhook_secret"].as_str().unwrap().len() == 64);
        });
    }
}
