//! C1: deterministic fingerprint + SHA-256 over an upstream's advertised
//! capability surface.
//!
//! Grounded on `original_source/mcp_guardian/app/services/canonicalize.py`.
//! No crate in the retrieved corpus implements RFC 8785 JCS, so this is
//! hand-rolled over `serde_json::Value`. It relies on two properties of
//! `serde_json` with the `preserve_order` feature left disabled (it is,
//! throughout this crate): `serde_json::Map`'s backing store is a
//! `BTreeMap`, so object members already iterate in code-point key order,
//! and `Value`'s own `Display`/`Serialize` impl emits no insignificant
//! whitespace. What's left to do by hand is number normalization
//! (`-0.0` → `0`) and rejecting the two IEEE-754 values that have no
//! representation in standard JSON.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::core::error::{GuardianError, GuardianResult};

/// Pluggable seam for the open question in spec.md §9 (`remove_volatile_fields`
/// in the Python original was a stub). No concrete implementation ships; an
/// operator who discovers upstream-volatile noise in a capability list can
/// supply one without touching the sort/hash pipeline below.
pub trait VolatileFieldFilter: Send + Sync {
    fn filter(&self, items: Vec<Value>) -> Vec<Value>;
}

/// Identity filter: keeps every field, matching the Python stub's behavior.
pub struct IdentityFilter;

impl VolatileFieldFilter for IdentityFilter {
    fn filter(&self, items: Vec<Value>) -> Vec<Value> {
        items
    }
}

/// Sort `items` by the string value of `key_field`; items lacking the key, or
/// where it isn't a string, sort as empty string (spec.md §4.1).
fn sort_by_stable_key(mut items: Vec<Value>, key_field: &str) -> Vec<Value> {
    items.sort_by(|a, b| {
        let ka = a.get(key_field).and_then(Value::as_str).unwrap_or("");
        let kb = b.get(key_field).and_then(Value::as_str).unwrap_or("");
        ka.cmp(kb)
    });
    items
}

/// Builds the four-key fingerprint object in the fixed order spec.md §4.1
/// requires: `{tools, resources, resource_templates, prompts}`.
pub fn create_fingerprint(
    tools: Vec<Value>,
    resources: Vec<Value>,
    resource_templates: Vec<Value>,
    prompts: Vec<Value>,
    filter: &dyn VolatileFieldFilter,
) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "tools".to_string(),
        Value::Array(sort_by_stable_key(filter.filter(tools), "name")),
    );
    obj.insert(
        "resources".to_string(),
        Value::Array(sort_by_stable_key(filter.filter(resources), "uri")),
    );
    obj.insert(
        "resource_templates".to_string(),
        Value::Array(sort_by_stable_key(
            filter.filter(resource_templates),
            "uriTemplate",
        )),
    );
    obj.insert(
        "prompts".to_string(),
        Value::Array(sort_by_stable_key(filter.filter(prompts), "name")),
    );
    Value::Object(obj)
}

/// Recursively normalize numbers and reject non-finite values. JSON has no
/// literal for `NaN`/`Infinity`, so any occurrence here implies an upstream
/// parser let one through (e.g. via an out-of-band typed SDK) — refused
/// outright rather than silently coerced.
fn normalize(value: &Value) -> GuardianResult<Value> {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(GuardianError::protocol(
                        "non-finite number in capability payload",
                    ));
                }
                if f == 0.0 {
                    // Canonicalize -0.0 to 0, per RFC 8785's ECMAScript number form.
                    return Ok(Value::Number(serde_json::Number::from(0)));
                }
            }
            Ok(Value::Number(n.clone()))
        }
        Value::Array(items) => {
            let normalized: GuardianResult<Vec<Value>> = items.iter().map(normalize).collect();
            Ok(Value::Array(normalized?))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), normalize(v)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// RFC 8785 canonical JSON text for `value`. Object member order is already
/// correct by construction (see module docs); this function normalizes
/// numbers and serializes with `serde_json`'s compact (whitespace-free)
/// writer.
pub fn canonicalize_json(value: &Value) -> GuardianResult<String> {
    let normalized = normalize(value)?;
    serde_json::to_string(&normalized).map_err(GuardianError::from)
}

/// Lower-case hex SHA-256 over the canonical JSON's UTF-8 bytes.
pub fn hash_canonical_json(canonical_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `create_snapshot_hash` in the Python original: fingerprint → canonicalize
/// → hash, in one call.
pub fn create_snapshot_hash(
    tools: Vec<Value>,
    resources: Vec<Value>,
    resource_templates: Vec<Value>,
    prompts: Vec<Value>,
    filter: &dyn VolatileFieldFilter,
) -> GuardianResult<(String, String)> {
    let fingerprint = create_fingerprint(tools, resources, resource_templates, prompts, filter);
    let canonical = canonicalize_json(&fingerprint)?;
    let hash = hash_canonical_json(&canonical);
    Ok((canonical, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn permutations_of_the_same_surface_hash_identically() {
        let (_, h1) = create_snapshot_hash(
            vec![json!({"name": "read"}), json!({"name": "write"})],
            vec![],
            vec![],
            vec![],
            &IdentityFilter,
        )
        .unwrap();
        let (_, h2) = create_snapshot_hash(
            vec![json!({"name": "write"}), json!({"name": "read"})],
            vec![],
            vec![],
            vec![],
            &IdentityFilter,
        )
        .unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn added_tool_flips_the_hash() {
        let (_, h1) = create_snapshot_hash(
            vec![json!({"name": "read"})],
            vec![],
            vec![],
            vec![],
            &IdentityFilter,
        )
        .unwrap();
        let (_, h2) = create_snapshot_hash(
            vec![json!({"name": "read"}), json!({"name": "delete"})],
            vec![],
            vec![],
            vec![],
            &IdentityFilter,
        )
        .unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn fingerprint_key_order_is_fixed() {
        let fp = create_fingerprint(vec![], vec![], vec![], vec![], &IdentityFilter);
        let canonical = canonicalize_json(&fp).unwrap();
        assert_eq!(
            canonical,
            r#"{"prompts":[],"resource_templates":[],"resources":[],"tools":[]}"#
        );
    }

    #[test]
    fn hash_is_a_pure_function_of_canonical_json() {
        let (canonical, hash) = create_snapshot_hash(
            vec![json!({"name": "read"})],
            vec![],
            vec![],
            vec![],
            &IdentityFilter,
        )
        .unwrap();
        assert_eq!(hash_canonical_json(&canonical), hash);
    }

    #[test]
    fn canonicalize_is_idempotent_under_reparse() {
        let fp = create_fingerprint(
            vec![json!({"name": "z"}), json!({"name": "a"})],
            vec![],
            vec![],
            vec![],
            &IdentityFilter,
        );
        let once = canonicalize_json(&fp).unwrap();
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        let twice = canonicalize_json(&reparsed).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_sort_key_sorts_as_empty_string() {
        let items = vec![json!({"name": "b"}), json!({"no_name": true}), json!({"name": "a"})];
        let sorted = sort_by_stable_key(items, "name");
        assert_eq!(sorted[0]["no_name"], json!(true));
        assert_eq!(sorted[1]["name"], json!("a"));
        assert_eq!(sorted[2]["name"], json!("b"));
    }

    #[test]
    fn negative_zero_normalizes_to_zero() {
        let v = json!({"weight": -0.0});
        let canonical = canonicalize_json(&v).unwrap();
        assert_eq!(canonical, r#"{"weight":0}"#);
    }

}
