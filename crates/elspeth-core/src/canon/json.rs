//! Canonical JSON serialization.
//!
//! Sorted object keys, no insignificant whitespace, UTF-8, canonical number
//! representation (integers without a trailing `.0`, no `-0`, `NaN`/`Inf`
//! rejected rather than silently coerced). Arrays keep the order given.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanonError {
    #[error("non-finite number in canonicalized payload")]
    NonFiniteNumber,
}

/// Serializes `value` to canonical JSON bytes.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, CanonError> {
    canonical_json_string(value).map(String::into_bytes)
}

/// Serializes `value` to a canonical JSON `String`.
pub fn canonical_json_string(value: &Value) -> Result<String, CanonError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), CanonError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)?),
        Value::String(s) => out.push_str(&serde_json::to_string(s).expect("string escaping cannot fail")),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (k, v)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).expect("string escaping cannot fail"));
                out.push(':');
                write_canonical(v, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn canonical_number(n: &serde_json::Number) -> Result<String, CanonError> {
    if let Some(f) = n.as_f64() {
        if !f.is_finite() {
            return Err(CanonError::NonFiniteNumber);
        }
        if f == 0.0 {
            return Ok("0".to_string());
        }
    }
    if let Some(i) = n.as_i64() {
        return Ok(i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return Ok(u.to_string());
    }
    Ok(n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let v = json!({"b": 1, "a": 2});
        assert_eq!(canonical_json_string(&v).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn preserves_array_order() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonical_json_string(&v).unwrap(), "[3,1,2]");
    }

    #[test]
    fn rejects_nan() {
        let v = json!({"x": f64::NAN});
        assert!(canonical_json_string(&v).is_err());
    }

    #[test]
    fn nested_objects_are_sorted_recursively() {
        let v = json!({"z": {"b": 1, "a": 2}, "a": 1});
        assert_eq!(canonical_json_string(&v).unwrap(), r#"{"a":1,"z":{"a":2,"b":1}}"#);
    }

    #[test]
    fn negative_zero_normalizes_to_zero() {
        let v = json!(-0.0);
        assert_eq!(canonical_json_string(&v).unwrap(), "0");
    }
}
