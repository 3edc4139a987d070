//! Path operations over a JSON document tree.
//!
//! The tree never stores `null` or empty objects: writing either removes the
//! subtree, and removing the last child of an object removes the object too.

use serde_json::{Map, Value};
use crate::paths::{child, segments};

pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments(path) {
        node = node.as_object()?.get(segment)?;
    }
    if is_absent(node) {
        None
    } else {
        Some(node)
    }
}

/// Replaces the subtree at `path`. Absent values (`null`, `{}`) remove it.
pub fn set(root: &mut Value, path: &str, value: Value) {
    let value = prune(value);
    if is_absent(&value) {
        remove(root, path);
        return;
    }
    set_in(root, &segments(path), value);
}

pub fn remove(root: &mut Value, path: &str) -> Option<Value> {
    let segments = segments(path);
    if segments.is_empty() {
        let old = std::mem::replace(root, Value::Object(Map::new()));
        return if is_absent(&old) { None } else { Some(old) };
    }
    remove_in(root, &segments)
}

/// Leaf values keyed by absolute path.
pub fn flatten(prefix: &str, value: &Value) -> Vec<(String, Value)> {
    let mut leaves = Vec::new();
    flatten_into(prefix, value, &mut leaves);
    leaves
}

/// Inverse of [`flatten`] for keys relative to a common prefix.
pub fn unflatten(leaves: impl IntoIterator<Item = (String, Value)>) -> Value {
    let mut root = Value::Object(Map::new());
    for (key, value) in leaves {
        if key.is_empty() {
            return value;
        }
        set_in(&mut root, &segments(&key), value);
    }
    root
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !is_absent(v))
                .collect(),
        ),
        other => other,
    }
}

fn set_in(node: &mut Value, segments: &[&str], value: Value) {
    match segments.split_first() {
        None => *node = value,
        Some((first, rest)) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let next = map.entry(first.to_string()).or_insert(Value::Null);
                set_in(next, rest, value);
            }
        }
    }
}

fn remove_in(node: &mut Value, segments: &[&str]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    let map = node.as_object_mut()?;
    if rest.is_empty() {
        return map.remove(*first);
    }
    let next = map.get_mut(*first)?;
    let removed = remove_in(next, rest);
    if is_absent(next) {
        map.remove(*first);
    }
    removed
}

fn flatten_into(prefix: &str, value: &Value, leaves: &mut Vec<(String, Value)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(&child(prefix, key), value, leaves);
            }
        }
        leaf => leaves.push((prefix.to_string(), leaf.clone())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut root = json!({});
        set(&mut root, "groups/g1/members/u1", json!({"name": "Ann", "state": "own"}));
        assert_eq!(get(&root, "groups/g1/members/u1/state"), Some(&json!("own")));
        assert_eq!(get(&root, "groups/g2"), None);
    }

    #[test]
    fn removing_last_child_prunes_parents() {
        let mut root = json!({});
        set(&mut root, "groups/g1/members/u1/name", json!("Ann"));
        set(&mut root, "users/u1/score/wins", json!(2));
        assert!(remove(&mut root, "groups/g1/members/u1").is_some());
        assert_eq!(get(&root, "groups"), None);
        assert_eq!(get(&root, "users/u1/score/wins"), Some(&json!(2)));
    }

    #[test]
    fn null_and_empty_objects_delete() {
        let mut root = json!({});
        set(&mut root, "a/b", json!(1));
        set(&mut root, "a/b", Value::Null);
        assert_eq!(get(&root, "a"), None);
        set(&mut root, "a", json!({"b": {}, "c": null}));
        assert_eq!(get(&root, "a"), None);
    }

    #[test]
    fn flatten_then_unflatten_restores_tree() {
        let value = json!({"name": "Chess", "members": {"u1": {"name": "Ann", "state": "own"}}});
        let leaves = flatten("groups/g1", &value);
        assert!(leaves.contains(&("groups/g1/members/u1/state".to_string(), json!("own"))));
        let relative = leaves
            .into_iter()
            .map(|(k, v)| (k.trim_start_matches("groups/g1/").to_string(), v));
        assert_eq!(unflatten(relative), value);
    }

    #[test]
    fn scalar_at_root_of_flatten() {
        assert_eq!(flatten("users/u1/name", &json!("Ann")), vec![("users/u1/name".to_string(), json!("Ann"))]);
        assert_eq!(unflatten(vec![(String::new(), json!(5))]), json!(5));
    }
}
