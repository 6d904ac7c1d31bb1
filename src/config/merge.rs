//! Layer merge: objects merge by key, arrays and scalars are replaced

use serde_json::Value;

/// Deep merge `overlay` onto `base`
///
/// Only objects merge recursively. A test list in a later layer replaces
/// the whole list, and an explicit null clears a value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }

        // Arrays, scalars and null: overlay wins
        (_, overlay) => overlay,
    }
}

/// Fold layers lowest precedence first
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
