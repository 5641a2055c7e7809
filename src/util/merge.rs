//! Deep merge of JSON documents.
//!
//! Objects merge key by key. Arrays merge element by element, pairing
//! elements that share an identity key (`id`, `name`, `type`, or
//! `data_stream.dataset`), so an override such as
//!
//! ```json
//! {"inputs": [{"type": "winlog", "streams": [{"data_stream": {"dataset": "windows.sysmon_operational"}, "enabled": false}]}]}
//! ```
//!
//! toggles one stream of a package policy without restating the others.

use serde_json::Value;

const IDENTITY_KEYS: &[&str] = &["/id", "/name", "/type", "/data_stream/dataset"];

/// Identity pointer shared by both elements, with equal values.
fn same_identity(a: &Value, b: &Value) -> bool {
    if !a.is_object() || !b.is_object() {
        return false;
    }
    IDENTITY_KEYS
        .iter()
        .find_map(|key| match (a.pointer(key), b.pointer(key)) {
            (Some(x), Some(y)) => Some(x == y),
            _ => None,
        })
        .unwrap_or(false)
}

/// Merge `overlay` into `base` in place.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(overlay_items)) => {
            for item in overlay_items {
                match base_items.iter().position(|b| same_identity(b, item)) {
                    Some(index) => deep_merge(&mut base_items[index], item),
                    None if !base_items.contains(item) => base_items.push(item.clone()),
                    None => {}
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whether `existing` already holds everything in `desired`.
///
/// Objects may carry extra keys; arrays must match element-wise. Scalars are
/// compared by their text, as Elasticsearch echoes settings like
/// `number_of_shards` back as strings.
pub fn is_subset(desired: &Value, existing: &Value) -> bool {
    match (desired, existing) {
        (Value::Object(want), Value::Object(have)) => want
            .iter()
            .all(|(k, v)| have.get(k).map_or(v.is_null(), |h| is_subset(v, h))),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| is_subset(w, h))
        }
        (want, have) => match (scalar_text(want), scalar_text(have)) {
            (Some(w), Some(h)) => w == h,
            _ => want == have,
        },
    }
}
