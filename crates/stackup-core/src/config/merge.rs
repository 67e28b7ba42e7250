//! Layer merge
//!
//! - Mappings: deep-merge by key
//! - Sequences: replaced wholesale by the higher layer
//! - Scalars, nulls and type mismatches: higher layer wins

use super::layer::ConfigLayer;
use super::resolved::ResolvedConfig;
use serde_json::{Map, Value};

/// Merge `overlay` into `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            Value::Object(merge_maps(base_map, overlay_map))
        }
        (_, overlay) => overlay,
    }
}

fn merge_maps(mut base: Map<String, Value>, overlay: Map<String, Value>) -> Map<String, Value> {
    // merge in place so existing keys keep their position
    for (key, overlay_value) in overlay {
        match base.get_mut(&key) {
            Some(slot) => {
                let base_value = std::mem::take(slot);
                *slot = deep_merge(base_value, overlay_value);
            }
            None => {
                base.insert(key, overlay_value);
            }
        }
    }
    base
}

/// Merge layers in precedence order.
///
/// Layers are stably sorted by origin first, so callers may pass them in any
/// order; layers of the same origin apply in the order given.
pub fn merge_layers(layers: &[ConfigLayer]) -> ResolvedConfig {
    let mut ordered: Vec<&ConfigLayer> = layers.iter().collect();
    ordered.sort_by_key(|layer| layer.origin());

    let root = ordered.into_iter().fold(Map::new(), |acc, layer| {
        tracing::debug!(layer = layer.name(), origin = %layer.origin(), "Merging config layer");
        merge_maps(acc, layer.values().clone())
    });
    ResolvedConfig::from_map(root)
}
