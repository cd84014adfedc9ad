//! Precedence-ordered merging of resolved chains.
//!
//! Nodes merge pairwise in descending rank order: the most distant ancestor
//! is applied first, then nearer ancestors, then the root, then descendants,
//! so the deepest child always has final precedence. `data` trees merge
//! field-by-field; arrays are replaced entirely, not concatenated. `env`
//! maps merge by shallow override.

use crate::chain::ConfigChain;
use crate::node::{ConfigNode, MergedConfig};
use serde_json::Value;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans, nulls are replaced entirely
///
/// # Example
/// ```
/// use serde_json::json;
/// use config_loom::merge::deep_merge;
///
/// let base = json!({
///     "server": { "port": 8080, "host": "localhost" },
///     "features": ["a", "b"]
/// });
/// let overlay = json!({
///     "server": { "port": 9000 },
///     "features": ["c"]
/// });
/// let result = deep_merge(base, overlay);
/// // Result: { "server": { "port": 9000, "host": "localhost" }, "features": ["c"] }
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        // Both are objects: merge recursively
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        // Any other case (including an explicit null): overlay replaces base
        (_, overlay) => overlay,
    }
}

/// Merge one node over another. `overlay.data` deep-merges into `base.data`;
/// `overlay.env` keys shadow `base.env` keys wholesale; the remaining fields
/// come from the overlay.
pub fn merge_nodes(base: ConfigNode, overlay: ConfigNode) -> ConfigNode {
    let mut env = base.env;
    env.extend(overlay.env);
    ConfigNode {
        data: deep_merge(base.data, overlay.data),
        env,
        parent: overlay.parent,
        child: overlay.child,
        watch: overlay.watch,
    }
}

/// Left-fold the chain in descending rank order into a single node.
///
/// The first node (most distant ancestor) seeds the accumulator unchanged;
/// every subsequent node overrides the accumulated result.
pub fn reduce(chain: ConfigChain) -> MergedConfig {
    let mut nodes = chain.into_descending();
    let Some(first) = nodes.next() else {
        return ConfigNode::new();
    };
    nodes.fold(first, merge_nodes)
}
