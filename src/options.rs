//! Nested transport-option trees.
//!
//! Options are carried as a [`serde_json::Value`] tree of capability flags.
//! Composition uses an explicit deep merge: nested maps merge key by key,
//! scalar and list leaves are replaced, and the later value wins. Dotted
//! paths (`"ssl.verify_peer"`) address individual leaves.

use serde_json::Value;

/// Merge `overlay` into `base`.
///
/// Maps merge recursively; any other pair of values is resolved in favor of
/// the overlay leaf.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Look up a leaf by dotted path. Returns `None` when any segment is missing
/// or a non-map value is traversed.
pub fn get<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = tree;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set a leaf by dotted path, creating intermediate maps as needed. Any
/// non-map value along the path is replaced by a map.
pub fn set(tree: &mut Value, path: &str, value: Value) {
    if !tree.is_object() {
        *tree = Value::Object(serde_json::Map::new());
    }
    let mut current = tree;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let map = current.as_object_mut().expect("path node is a map");
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        let next = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !next.is_object() {
            *next = Value::Object(serde_json::Map::new());
        }
        current = next;
    }
}
