//! Evaluates the directive tree against the resolved configuration

use super::parser::{Condition, Filter, ForBlock, IfBlock, Node, Output, LOOP_VAR};
use crate::config::keypath::{get_in, KeyPath};
use crate::config::layer::type_name;
use crate::error::{Error, Result};
use serde_json::{json, Map, Value};

/// Lexical scope: the configuration root plus one frame per enclosing `for`.
/// The innermost frame is searched first.
pub struct Scope<'a> {
    root: &'a Value,
    frames: Vec<Value>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            frames: Vec::new(),
        }
    }

    /// Resolve a path. The first segment picks the innermost frame that binds it.
    pub fn lookup(&self, path: &KeyPath) -> Option<&Value> {
        if let Some(head) = path.head_key() {
            for frame in self.frames.iter().rev() {
                if frame.get(head).is_some() {
                    return get_in(frame, path.segments());
                }
            }
        }
        get_in(self.root, path.segments())
    }

    fn push(&mut self, frame: Value) {
        self.frames.push(frame);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }
}

/// Truthiness: non-empty string/sequence/mapping, non-zero number, `true`
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Textual form used for substitution. Structured values become compact
/// JSON, which both YAML and JSON templates accept inline.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn apply_filters(value: &Value, filters: &[Filter]) -> String {
    let mut current: Option<String> = None;
    for filter in filters {
        let text = match (filter, current.take()) {
            (Filter::Json, None) => value.to_string(),
            (Filter::Json, Some(text)) => Value::String(text).to_string(),
            (other, prior) => {
                let text = prior.unwrap_or_else(|| to_text(value));
                match other {
                    Filter::Upper => text.to_uppercase(),
                    Filter::Lower => text.to_lowercase(),
                    Filter::Trim => text.trim().to_string(),
                    Filter::Json => text,
                }
            }
        };
        current = Some(text);
    }
    current.unwrap_or_else(|| to_text(value))
}

pub struct Renderer<'t> {
    template: &'t str,
}

impl<'t> Renderer<'t> {
    pub fn new(template: &'t str) -> Self {
        Self { template }
    }

    pub fn render(&self, nodes: &[Node], scope: &mut Scope<'_>) -> Result<String> {
        let mut out = String::new();
        self.render_into(nodes, scope, &mut out)?;
        Ok(out)
    }

    fn render_into(&self, nodes: &[Node], scope: &mut Scope<'_>, out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(output) => out.push_str(&self.render_output(output, scope)?),
                Node::If(block) => self.render_if(block, scope, out)?,
                Node::For(block) => self.render_for(block, scope, out)?,
            }
        }
        Ok(())
    }

    fn render_output(&self, output: &Output, scope: &Scope<'_>) -> Result<String> {
        let value = scope
            .lookup(&output.path)
            .ok_or_else(|| Error::unresolved(output.path.as_str()))?;
        Ok(apply_filters(value, &output.filters))
    }

    fn evaluate(&self, condition: &Condition, scope: &Scope<'_>) -> bool {
        // An absent key is falsy: conditions are how templates test for optional config
        let truthy = scope.lookup(&condition.path).is_some_and(is_truthy);
        truthy != condition.negated
    }

    fn render_if(&self, block: &IfBlock, scope: &mut Scope<'_>, out: &mut String) -> Result<()> {
        for (condition, body) in &block.branches {
            if self.evaluate(condition, scope) {
                return self.render_into(body, scope, out);
            }
        }
        self.render_into(&block.otherwise, scope, out)
    }

    fn render_for(&self, block: &ForBlock, scope: &mut Scope<'_>, out: &mut String) -> Result<()> {
        let source = scope
            .lookup(&block.source)
            .ok_or_else(|| Error::unresolved(block.source.as_str()))?;

        let items: Vec<(Value, Value)> = match source {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (json!(i), v.clone()))
                .collect(),
            Value::Object(map) if block.key_var.is_some() => map
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(Error::TemplateSyntax {
                    template: self.template.to_string(),
                    line: block.line,
                    message: format!(
                        "cannot iterate over '{}' ({}){}",
                        block.source,
                        type_name(other),
                        if other.is_object() {
                            "; use 'for key, value in ...' for mappings"
                        } else {
                            ""
                        }
                    ),
                })
            }
        };

        if items.is_empty() {
            return self.render_into(&block.otherwise, scope, out);
        }

        let length = items.len();
        for (index, (key, value)) in items.into_iter().enumerate() {
            let mut frame = match &value {
                Value::Object(fields) => fields.clone(),
                _ => Map::new(),
            };
            frame.insert(block.value_var.clone(), value);
            if let Some(key_var) = &block.key_var {
                frame.insert(key_var.clone(), key);
            }
            frame.insert(
                LOOP_VAR.to_string(),
                json!({
                    "index": index + 1,
                    "index0": index,
                    "first": index == 0,
                    "last": index + 1 == length,
                    "length": length,
                }),
            );

            scope.push(Value::Object(frame));
            let rendered = self.render_into(&block.body, scope, out);
            scope.pop();
            rendered?;
        }
        Ok(())
    }
}
