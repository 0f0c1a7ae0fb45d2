//! JSON merge helpers for layered configuration.

use serde_json::Value;

/// Merge overlay values into the base, recursively overriding objects.
///
/// Arrays are replaced wholesale so a layer can shorten a command line.
pub(super) fn merge_json_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::merge_json_values;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn nested_objects_merge_and_arrays_replace() {
        let mut base = json!({
            "api": { "base_url": "http://a", "chat_timeout_ms": 10 },
            "audio": { "command": ["arecord", "-q", "-"] }
        });
        let overlay = json!({
            "api": { "base_url": "http://b" },
            "audio": { "command": ["rec", "-"] }
        });
        merge_json_values(&mut base, &overlay);
        assert_eq!(
            base,
            json!({
                "api": { "base_url": "http://b", "chat_timeout_ms": 10 },
                "audio": { "command": ["rec", "-"] }
            })
        );
    }
}
