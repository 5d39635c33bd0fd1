//! Document tree helpers
//!
//! Flattening of JSON documents into `(path, leaf)` pairs. Paths use the
//! same notation as validation issues: `redis.port`, `backend.portMappings[0]`.

use serde_json::Value;

/// Append an object key to a path
pub fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Append an array index to a path
pub fn index(parent: &str, i: usize) -> String {
    format!("{parent}[{i}]")
}

/// Every leaf of the document with its path.
///
/// Empty arrays and objects count as leaves so that clearing a list still
/// shows up as a change.
pub fn leaves(value: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    collect(String::new(), value, &mut out);
    out
}

fn collect<'a>(path: String, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect(join(&path, key), child, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                collect(index(&path, i), child, out);
            }
        }
        _ => out.push((path, value)),
    }
}

/// Every string leaf of the document with its path
pub fn string_leaves(value: &Value) -> Vec<(String, &str)> {
    leaves(value)
        .into_iter()
        .filter_map(|(path, leaf)| leaf.as_str().map(|s| (path, s)))
        .collect()
}

/// Mutable leaf at `path`, using the notation produced by [`leaves`]
pub fn leaf_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    find_mut(String::new(), value, path)
}

fn find_mut<'a>(current: String, value: &'a mut Value, target: &str) -> Option<&'a mut Value> {
    if current == target {
        return Some(value);
    }
    if !target.starts_with(current.as_str()) {
        return None;
    }

    match value {
        Value::Object(map) => map
            .iter_mut()
            .find_map(|(key, child)| find_mut(join(&current, key), child, target)),
        Value::Array(items) => items
            .iter_mut()
            .enumerate()
            .find_map(|(i, child)| find_mut(index(&current, i), child, target)),
        _ => None,
    }
}

/// First path segment, the settings group a path belongs to
pub fn root_segment(path: &str) -> &str {
    let end = path.find(['.', '[']).unwrap_or(path.len());
    &path[..end]
}
