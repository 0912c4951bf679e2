//! Structural walkers over dynamic JSON payloads.
//!
//! The bridge manipulates twin state as untyped `serde_json::Value`
//! trees: re-applying envelope paths, descending to the subtree a path
//! addresses, and computing the merge that turns a full-state replace
//! into an AWS Shadow document with explicit `null` tombstones.

use serde_json::{Map, Value};

/// Split a JSON-pointer-style path into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Wrap a value in nested single-key objects, innermost last.
///
/// `wrap(["a", "b"], 1)` yields `{"a":{"b":1}}`.
pub fn wrap(segments: &[&str], value: Value) -> Value {
    segments.iter().rev().fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    })
}

/// Re-apply an envelope path onto its value, reconstructing the state
/// subtree the envelope addresses.
///
/// Path `/features/F/properties/P` with value `200` reconstructs
/// `{"features":{"F":{"properties":{"P":200}}}}`.
pub fn integrate(path: &str, value: Value) -> Value {
    wrap(&path_segments(path), value)
}

/// Descend a value along object keys (or array indices for numeric
/// segments). Returns `None` when any step is missing or untraversable.
pub fn descend<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Deep-merge an incoming replacement against the previously reported
/// state, producing the document to publish.
///
/// Keys present in `next` take its values (recursively merged when both
/// sides are containers); keys present only in `prev` become `null`
/// tombstones so AWS removes them. Arrays merge index-wise and take the
/// incoming length. Anything else is replaced outright.
pub fn merge_with_tombstones(prev: &Value, next: &Value) -> Value {
    match (prev, next) {
        (Value::Object(prev_map), Value::Object(next_map)) => {
            let mut merged = Map::new();
            for (key, next_value) in next_map {
                let value = match prev_map.get(key) {
                    Some(prev_value) => merge_with_tombstones(prev_value, next_value),
                    None => next_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            for key in prev_map.keys() {
                if !next_map.contains_key(key) {
                    merged.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(merged)
        }
        (Value::Array(prev_items), Value::Array(next_items)) => Value::Array(
            next_items
                .iter()
                .enumerate()
                .map(|(i, next_item)| match prev_items.get(i) {
                    Some(prev_item) => merge_with_tombstones(prev_item, next_item),
                    None => next_item.clone(),
                })
                .collect(),
        ),
        _ => next.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integrate_wraps_path_in_reverse() {
        assert_eq!(
            integrate("/features/F/properties/P", json!(200)),
            json!({"features":{"F":{"properties":{"P":200}}}})
        );
    }

    #[test]
    fn integrate_skips_empty_segments() {
        assert_eq!(integrate("/", json!({"a":1})), json!({"a":1}));
        assert_eq!(integrate("", json!(5)), json!(5));
        assert_eq!(integrate("//a//b", json!(1)), json!({"a":{"b":1}}));
    }

    #[test]
    fn descend_objects_and_arrays() {
        let value = json!({"a":{"b":[10, {"c": 20}]}});
        assert_eq!(descend(&value, &[]), Some(&value));
        assert_eq!(descend(&value, &["a", "b", "0"]), Some(&json!(10)));
        assert_eq!(descend(&value, &["a", "b", "1", "c"]), Some(&json!(20)));
        assert_eq!(descend(&value, &["a", "missing"]), None);
        assert_eq!(descend(&value, &["a", "b", "0", "c"]), None);
    }

    #[test]
    fn merge_tombstones_removed_keys() {
        let prev = json!({"status":100,"obsolete":"true"});
        let next = json!({"status":200});
        assert_eq!(
            merge_with_tombstones(&prev, &next),
            json!({"obsolete":null,"status":200})
        );
    }

    #[test]
    fn merge_recurses_into_nested_maps() {
        let prev = json!({"nested":{"status":100,"obsolete":"true"}});
        let next = json!({"nested":{"status":200}});
        assert_eq!(
            merge_with_tombstones(&prev, &next),
            json!({"nested":{"obsolete":null,"status":200}})
        );
    }

    #[test]
    fn merge_arrays_index_wise_taking_incoming_length() {
        let prev = json!({"nested":["firstOld",{"status":100,"obsolete":"true"},"third"]});
        let next = json!({"nested":["firstNew",{"status":200}]});
        assert_eq!(
            merge_with_tombstones(&prev, &next),
            json!({"nested":["firstNew",{"obsolete":null,"status":200}]})
        );
    }

    #[test]
    fn merge_replaces_on_type_mismatch() {
        let prev = json!({"status":{"code":100}});
        let next = json!({"status":200});
        assert_eq!(merge_with_tombstones(&prev, &next), json!({"status":200}));

        let prev = json!(100);
        let next = json!({"code":200});
        assert_eq!(merge_with_tombstones(&prev, &next), json!({"code":200}));
    }

    #[test]
    fn merge_incoming_null_wins() {
        let prev = json!({"a":1});
        let next = Value::Null;
        assert_eq!(merge_with_tombstones(&prev, &next), Value::Null);
    }
}
