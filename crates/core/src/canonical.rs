//! Canonical JSON serialization and content hashing.
//!
//! `canonicalize` is the single routine through which every hashable entity
//! is turned into bytes. The output is compact JSON with:
//!
//! - object keys sorted by byte order, at every depth
//! - no insignificant whitespace
//! - integers written verbatim
//! - non-integer numbers re-rendered through the canonical decimal form
//!
//! `hash` is the lowercase hex SHA-256 of those bytes. Both are pure and hold
//! no shared state, so they are safe to call from any thread.

use std::io::Write;

use serde::Serialize;
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

use crate::numeric::{canonical_string, parse_decimal};

/// Errors raised while canonicalizing a value.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    #[error("value is not representable as JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("number '{0}' has no exact decimal representation")]
    UnrepresentableNumber(String),
}

/// Serialize `value` into canonical JSON bytes.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let tree = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(256);
    write_value(&tree, &mut out)?;
    Ok(out)
}

/// Canonical JSON as a `String`.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let bytes = canonicalize(value)?;
    // write_value only emits UTF-8 (serde_json string escapes + ASCII tokens)
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Hex-encoded SHA-256 over the canonical bytes of `value`.
pub fn hash<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    Ok(sha256_hex(&canonicalize(value)?))
}

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash a collection without regard to its order.
///
/// Each element is canonicalized, the encodings are sorted, and the hash is
/// taken over the resulting canonical JSON array.
pub fn hash_unordered<T: Serialize>(items: &[T]) -> Result<String, CanonicalError> {
    let mut encoded = items
        .iter()
        .map(canonicalize)
        .collect::<Result<Vec<_>, _>>()?;
    encoded.sort();

    let mut out = Vec::with_capacity(encoded.iter().map(|e| e.len() + 1).sum::<usize>() + 2);
    out.push(b'[');
    for (i, item) in encoded.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(item);
    }
    out.push(b']');
    Ok(sha256_hex(&out))
}

/// Return the items ordered by their canonical encoding.
///
/// Used wherever a list must be consumed in an order that does not depend on
/// how the caller happened to assemble it.
pub fn sorted_by_canonical<T: Serialize>(items: &[T]) -> Result<Vec<&T>, CanonicalError> {
    let mut keyed = items
        .iter()
        .map(|item| canonicalize(item).map(|bytes| (bytes, item)))
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// Pair each item with its index and order the pairs by canonical encoding.
///
/// Items with identical encodings keep their relative order.
pub fn indexed_by_canonical<T: Serialize>(
    items: &[T],
) -> Result<Vec<(usize, &T)>, CanonicalError> {
    let mut keyed = items
        .iter()
        .enumerate()
        .map(|(index, item)| canonicalize(item).map(|bytes| (bytes, index, item)))
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    Ok(keyed
        .into_iter()
        .map(|(_, index, item)| (index, item))
        .collect())
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => serde_json::to_writer(&mut *out, s)?,
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(item, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_number(n: &Number, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{}", i);
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{}", u);
        return Ok(());
    }
    let text = n.to_string();
    let decimal =
        parse_decimal(&text).ok_or_else(|| CanonicalError::UnrepresentableNumber(text.clone()))?;
    out.extend_from_slice(canonical_string(decimal).as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let v = json!({"b": 1, "a": {"z": true, "m": null}});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"a":{"m":null,"z":true},"b":1}"#
        );
    }

    #[test]
    fn map_insertion_order_does_not_matter() {
        let mut first = HashMap::new();
        first.insert("fuel", "ng");
        first.insert("electricity", "grid");
        first.insert("process", "clinker");

        let mut second = HashMap::new();
        second.insert("process", "clinker");
        second.insert("fuel", "ng");
        second.insert("electricity", "grid");

        assert_eq!(hash(&first).unwrap(), hash(&second).unwrap());
    }

    #[test]
    fn float_numbers_use_decimal_form() {
        let v = json!({"x": 0.5, "y": 2.50, "z": 10});
        assert_eq!(canonical_json(&v).unwrap(), r#"{"x":0.5,"y":2.5,"z":10}"#);
    }

    #[test]
    fn strings_are_escaped() {
        let v = json!({"note": "a \"quoted\" line\n"});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"note":"a \"quoted\" line\n"}"#
        );
    }

    #[test]
    fn hash_is_idempotent_and_sensitive() {
        let a = json!({"total": "100"});
        let b = json!({"total": "100.1"});
        assert_eq!(hash(&a).unwrap(), hash(&a).unwrap());
        assert_ne!(hash(&a).unwrap(), hash(&b).unwrap());
        assert_eq!(hash(&a).unwrap().len(), 64);
    }

    #[test]
    fn unordered_hash_ignores_list_order() {
        let a = vec![json!({"k": 1}), json!({"k": 2})];
        let b = vec![json!({"k": 2}), json!({"k": 1})];
        assert_eq!(hash_unordered(&a).unwrap(), hash_unordered(&b).unwrap());
        assert_ne!(hash(&a).unwrap(), hash(&b).unwrap());
    }

    #[test]
    fn sorted_by_canonical_is_stable_across_input_order() {
        let a = vec!["b", "c", "a"];
        let b = vec!["c", "a", "b"];
        assert_eq!(
            sorted_by_canonical(&a).unwrap(),
            sorted_by_canonical(&b).unwrap()
        );
    }

    #[test]
    fn indexed_order_depends_only_on_content() {
        let rows = vec![json!({"q": "5"}), json!({"q": "0"}), json!({"q": "5"})];
        let order: Vec<usize> = indexed_by_canonical(&rows)
            .unwrap()
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(order, vec![1, 0, 2]);
    }
}
