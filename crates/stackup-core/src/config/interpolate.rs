//! Self-references inside configuration values
//!
//! String values may contain `{{ key.path }}` placeholders bound against the
//! resolved tree itself, e.g. `prefix: "{{ stackName }}-{{ deployment }}"`.
//! A string made of exactly one placeholder takes the referenced value's type.
//! The `env` subtree is data and is never interpolated.

use super::resolved::ResolvedConfig;
use crate::error::{Error, Result};
use crate::template::{Node, Renderer, Scope, TemplateDocument};
use serde_json::{Map, Value};

/// Maximum chain of references before the tree is considered cyclic
pub const MAX_PASSES: usize = 16;

const SKIPPED_KEYS: &[&str] = &["env"];

pub fn interpolate(config: ResolvedConfig) -> Result<ResolvedConfig> {
    let mut root = config.into_value();

    for pass in 0..MAX_PASSES {
        let snapshot = root.clone();
        let mut changed = false;
        let mut pending = false;

        if let Value::Object(map) = &mut root {
            for (key, value) in map.iter_mut() {
                if SKIPPED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                interpolate_value(value, key, &snapshot, &mut changed, &mut pending)?;
            }
        }

        if !pending {
            tracing::debug!(passes = pass + 1, "Config interpolation complete");
            return ResolvedConfig::from_value(root);
        }
        if !changed {
            break;
        }
    }

    Err(Error::config(
        "resolved configuration",
        format!(
            "self-references did not settle after {} passes (reference cycle?)",
            MAX_PASSES
        ),
    ))
}

fn interpolate_value(
    value: &mut Value,
    location: &str,
    snapshot: &Value,
    changed: &mut bool,
    pending: &mut bool,
) -> Result<()> {
    match value {
        Value::String(text) if text.contains("{{") || text.contains("{%") => {
            let rendered = render_string(text, location, snapshot)?;
            if rendered != *value {
                *changed = true;
            }
            // a copied mapping or sequence may still hold placeholders
            if has_placeholder(&rendered) {
                *pending = true;
            }
            *value = rendered;
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                interpolate_value(item, &format!("{}[{}]", location, i), snapshot, changed, pending)?;
            }
        }
        Value::Object(map) => interpolate_map(map, location, snapshot, changed, pending)?,
        _ => {}
    }
    Ok(())
}

fn interpolate_map(
    map: &mut Map<String, Value>,
    location: &str,
    snapshot: &Value,
    changed: &mut bool,
    pending: &mut bool,
) -> Result<()> {
    for (key, value) in map.iter_mut() {
        interpolate_value(value, &format!("{}.{}", location, key), snapshot, changed, pending)?;
    }
    Ok(())
}

fn has_placeholder(value: &Value) -> bool {
    match value {
        Value::String(text) => text.contains("{{"),
        Value::Array(items) => items.iter().any(has_placeholder),
        Value::Object(map) => map.values().any(has_placeholder),
        _ => false,
    }
}

fn render_string(text: &str, location: &str, snapshot: &Value) -> Result<Value> {
    let doc = TemplateDocument::new(location, text);
    let nodes = doc.parse()?;
    if nodes
        .iter()
        .any(|node| matches!(node, Node::If(_) | Node::For(_)))
    {
        return Err(Error::config(
            location,
            "only {{ }} placeholders are allowed in configuration values",
        ));
    }

    let mut scope = Scope::new(snapshot);
    if let [Node::Output(output)] = nodes.as_slice() {
        if output.filters.is_empty() {
            return scope
                .lookup(&output.path)
                .cloned()
                .ok_or_else(|| Error::unresolved(output.path.as_str()));
        }
    }

    let text = Renderer::new(location).render(&nodes, &mut scope)?;
    Ok(Value::String(text))
}
