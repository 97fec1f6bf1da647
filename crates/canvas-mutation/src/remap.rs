//! ID remapping shared by the Canvas Mutation Engine and Canvas Cloner:
//! three independent mapping tables populated in a single pass, with every
//! downstream rewrite reading only from those tables rather than inferring
//! remapped ids from structure.

use std::collections::HashMap;

use canvas_graph::ResultEnvelope;

/// Three independent id-mapping tables: node ids, handle ids, edge ids.
/// Every downstream rewrite (edges, node-config references, node-result
/// references) reads only from these, never from the shape of the data.
#[derive(Debug, Clone, Default)]
pub struct IdMaps {
    pub nodes: HashMap<String, String>,
    pub handles: HashMap<String, String>,
    pub edges: HashMap<String, String>,
}

impl IdMaps {
    pub fn node(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(String::as_str)
    }

    pub fn handle(&self, id: &str) -> Option<&str> {
        self.handles.get(id).map(String::as_str)
    }
}

/// Rewrite the handle-id keys of `config.layerUpdates` (Compositor /
/// VideoCompositor) and any nested `inputHandleId` fields, using
/// `handle_map`. Keys/fields with no mapping
/// entry are left untouched — they already name a real, unaffected handle.
pub fn rewrite_layer_updates(config: &mut serde_json::Value, handle_map: &HashMap<String, String>) {
    let Some(layer_updates) = config.get_mut("layerUpdates").and_then(|v| v.as_object_mut()) else {
        return;
    };

    let rekeyed: serde_json::Map<String, serde_json::Value> = std::mem::take(layer_updates)
        .into_iter()
        .map(|(key, mut value)| {
            if let Some(inner) = value.get_mut("inputHandleId").and_then(|v| v.as_str()) {
                if let Some(mapped) = handle_map.get(inner) {
                    value["inputHandleId"] = serde_json::json!(mapped);
                }
            }
            let new_key = handle_map.get(&key).cloned().unwrap_or(key);
            (new_key, value)
        })
        .collect();

    *config.get_mut("layerUpdates").expect("checked above") = serde_json::Value::Object(rekeyed);
}

/// Rewrite every `outputHandleId` inside `result.outputs[].items[]` using
/// `handle_map`.
pub fn rewrite_result_handle_ids(result: &mut ResultEnvelope, handle_map: &HashMap<String, String>) {
    for output in &mut result.outputs {
        for item in &mut output.items {
            if let Some(mapped) = handle_map.get(&item.output_handle_id) {
                item.output_handle_id = mapped.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_layer_update_keys_and_nested_handle_ids() {
        let mut handle_map = HashMap::new();
        handle_map.insert("temp-h-1".to_string(), "h-real-1".to_string());

        let mut config = serde_json::json!({
            "layerUpdates": {
                "temp-h-1": { "inputHandleId": "temp-h-1", "opacity": 0.5 }
            }
        });

        rewrite_layer_updates(&mut config, &handle_map);

        let layer_updates = config["layerUpdates"].as_object().unwrap();
        assert!(layer_updates.contains_key("h-real-1"));
        assert!(!layer_updates.contains_key("temp-h-1"));
        assert_eq!(layer_updates["h-real-1"]["inputHandleId"], "h-real-1");
    }

    #[test]
    fn leaves_unmapped_keys_untouched() {
        let handle_map = HashMap::new();
        let mut config = serde_json::json!({ "layerUpdates": { "h-existing": { "opacity": 1.0 } } });
        rewrite_layer_updates(&mut config, &handle_map);
        assert!(config["layerUpdates"].as_object().unwrap().contains_key("h-existing"));
    }
}
