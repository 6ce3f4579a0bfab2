//! Lenient value coercion and nested-tree helpers.
//!
//! Ledger nodes are `serde_json::Value` trees. Numeric fields written by
//! older clients may arrive as strings, integers, or floats; `null` and
//! unparsable values fall back to the caller's default. Coercion here is
//! deliberately forgiving — the strictness lives in the model layer.

use serde_json::Value;

use crate::path::Path;

// ── Coercion ────────────────────────────────────────────────────────

/// Coerce a value to i64: integer, float (truncated), or numeric string.
pub fn as_i64_lenient(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Coerce a value to f64: number or numeric string.
pub fn as_f64_lenient(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Read the first coercible i64 among several field names on an object.
/// Used for legacy alias keys (`inRackCount` falling back to `inRack`).
pub fn first_i64(obj: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        if let Some(v) = obj.get(key) {
            if let Some(i) = as_i64_lenient(v) {
                return Some(i);
            }
        }
    }
    None
}

// ── Tree navigation ─────────────────────────────────────────────────

/// Get a reference to the node at `path`, if present.
pub fn get_at<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut node = root;
    for seg in path.segments() {
        node = node.get(seg)?;
    }
    Some(node)
}

/// Set the node at `path`, creating intermediate objects as needed.
/// Setting `Value::Null` removes the node instead — the ledger never
/// stores explicit nulls.
pub fn set_at(root: &mut Value, path: &Path, value: Value) {
    if value.is_null() {
        remove_at(root, path);
        return;
    }
    if path.is_root() {
        *root = value;
        return;
    }

    let segments: Vec<&str> = path.segments().collect();
    let mut node = root;
    for seg in &segments[..segments.len() - 1] {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        node = node
            .as_object_mut()
            .expect("just ensured object")
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(serde_json::Map::new());
    }
    node.as_object_mut()
        .expect("just ensured object")
        .insert(segments[segments.len() - 1].to_string(), value);
}

/// Remove the node at `path`. Returns true if something was removed.
pub fn remove_at(root: &mut Value, path: &Path) -> bool {
    if path.is_root() {
        let had = !root.is_null();
        *root = Value::Object(serde_json::Map::new());
        return had;
    }

    let segments: Vec<&str> = path.segments().collect();
    let mut node = root;
    for seg in &segments[..segments.len() - 1] {
        match node.get_mut(*seg) {
            Some(next) => node = next,
            None => return false,
        }
    }
    node.as_object_mut()
        .map(|obj| obj.remove(segments[segments.len() - 1]).is_some())
        .unwrap_or(false)
}

/// Add `delta` to the integer at `path` (missing or unparsable counts as
/// zero) and write the sum back. Returns the new value.
pub fn increment_at(root: &mut Value, path: &Path, delta: i64) -> i64 {
    let current = get_at(root, path).and_then(as_i64_lenient).unwrap_or(0);
    let next = current + delta;
    set_at(root, path, Value::from(next));
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn i64_coercion_accepts_mixed_representations() {
        assert_eq!(as_i64_lenient(&json!(7)), Some(7));
        assert_eq!(as_i64_lenient(&json!(7.9)), Some(7));
        assert_eq!(as_i64_lenient(&json!("12")), Some(12));
        assert_eq!(as_i64_lenient(&json!(" 3.0 ")), Some(3));
        assert_eq!(as_i64_lenient(&json!("abc")), None);
        assert_eq!(as_i64_lenient(&Value::Null), None);
    }

    #[test]
    fn f64_coercion() {
        assert_eq!(as_f64_lenient(&json!(2.5)), Some(2.5));
        assert_eq!(as_f64_lenient(&json!("2.5")), Some(2.5));
        assert_eq!(as_f64_lenient(&json!(true)), None);
    }

    #[test]
    fn first_i64_prefers_earlier_keys() {
        let obj = json!({"inRack": 4, "inRackCount": "9"});
        assert_eq!(first_i64(&obj, &["inRackCount", "inRack"]), Some(9));
        assert_eq!(first_i64(&obj, &["missing", "inRack"]), Some(4));
        assert_eq!(first_i64(&obj, &["missing"]), None);
    }

    #[test]
    fn set_get_remove_roundtrip() {
        let mut root = json!({});
        set_at(&mut root, &Path::new("a/b/c"), json!(1));
        assert_eq!(get_at(&root, &Path::new("a/b/c")), Some(&json!(1)));
        assert_eq!(get_at(&root, &Path::new("a/b")), Some(&json!({"c": 1})));

        assert!(remove_at(&mut root, &Path::new("a/b/c")));
        assert!(!remove_at(&mut root, &Path::new("a/b/c")));
        assert_eq!(get_at(&root, &Path::new("a/b")), Some(&json!({})));
    }

    #[test]
    fn set_null_removes() {
        let mut root = json!({"a": {"b": 1}});
        set_at(&mut root, &Path::new("a/b"), Value::Null);
        assert_eq!(get_at(&root, &Path::new("a/b")), None);
    }

    #[test]
    fn set_replaces_scalar_with_object() {
        let mut root = json!({"a": 5});
        set_at(&mut root, &Path::new("a/b"), json!(2));
        assert_eq!(get_at(&root, &Path::new("a/b")), Some(&json!(2)));
    }

    #[test]
    fn increment_treats_missing_as_zero() {
        let mut root = json!({});
        assert_eq!(increment_at(&mut root, &Path::new("counters/x"), 1), 1);
        assert_eq!(increment_at(&mut root, &Path::new("counters/x"), -3), -2);
        // String-typed counters still increment.
        set_at(&mut root, &Path::new("counters/y"), json!("10"));
        assert_eq!(increment_at(&mut root, &Path::new("counters/y"), 5), 15);
    }
}
