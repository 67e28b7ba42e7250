//! Template expansion
//!
//! This module provides:
//! - Tokenizing and parsing `{{ }}` / `{% %}` / `{# #}` directives
//! - Rendering the directive tree against a `ResolvedConfig`
//! - The compiled output type and its syntax check
//!
//! Expansion is total: every substitution either binds to a value or the
//! whole expansion fails with `UnresolvedReference` naming the path.

pub mod lexer;
pub mod parser;
pub mod render;

use crate::config::ResolvedConfig;
use crate::error::{Error, Result};
use std::path::Path;

pub use parser::{Filter, Node};
pub use render::{is_truthy, Renderer, Scope};

/// Raw template text with its display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDocument {
    pub name: String,
    pub source: String,
}

impl TemplateDocument {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::new(path.display().to_string(), source))
    }

    /// Tokenize and parse into the directive tree
    pub fn parse(&self) -> Result<Vec<Node>> {
        let tokens = lexer::tokenize(&self.name, &self.source)?;
        parser::parse(&self.name, tokens)
    }
}

/// Fully expanded template. Only produced by a successful `expand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    name: String,
    text: String,
}

impl CompiledTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Replace the text after a post-compile hook. The caller re-validates.
    pub fn with_text(self, text: String) -> Self {
        Self { text, ..self }
    }

    /// Parse the output as YAML (JSON templates parse too). Custom tags
    /// such as `!Ref` are accepted.
    pub fn validate_syntax(&self) -> Result<serde_yaml::Value> {
        serde_yaml::from_str::<serde_yaml::Value>(&self.text).map_err(|e| Error::TemplateSyntax {
            template: self.name.clone(),
            line: e.location().map(|l| l.line()).unwrap_or(0),
            message: format!("compiled output is not valid YAML/JSON: {}", e),
        })
    }
}

/// Expand `doc` against `cfg`
pub fn expand(doc: &TemplateDocument, cfg: &ResolvedConfig) -> Result<CompiledTemplate> {
    let nodes = doc.parse()?;
    let mut scope = Scope::new(cfg.as_value());
    let text = Renderer::new(&doc.name).render(&nodes, &mut scope)?;
    tracing::debug!(template = %doc.name, bytes = text.len(), "Template expanded");
    Ok(CompiledTemplate {
        name: doc.name.clone(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(value: serde_json::Value) -> ResolvedConfig {
        ResolvedConfig::from_value(value).unwrap()
    }

    fn render(source: &str, value: serde_json::Value) -> Result<String> {
        expand(&TemplateDocument::new("t", source), &cfg(value)).map(CompiledTemplate::into_text)
    }

    #[test]
    fn test_direct_substitution() {
        let out = render(
            "Description: {{ stackName }} ({{ deployment }})\nMemory: {{ lambdas.api.memory }}\n",
            json!({"stackName": "orders", "deployment": "prod", "lambdas": {"api": {"memory": 512}}}),
        )
        .unwrap();
        assert_eq!(out, "Description: orders (prod)\nMemory: 512\n");
    }

    #[test]
    fn test_unresolved_reference_names_path() {
        let err = render("a: {{ present }}\nb: {{ buckets.missing }}\n", json!({"present": 1}))
            .unwrap_err();
        match err {
            Error::UnresolvedReference { path } => assert_eq!(path, "buckets.missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_null_is_bound() {
        let out = render("v: {{ x }}", json!({"x": null})).unwrap();
        assert_eq!(out, "v: null");
    }

    #[test]
    fn test_conditional_on_truthy_bucket() {
        let source = "Resources:\n  {% if buckets.internal %}\n  Bucket:\n    Type: AWS::S3::Bucket\n  {% endif %}\n  Other: {}\n";
        let out = render(source, json!({"buckets": {"internal": "b"}})).unwrap();
        assert_eq!(
            out,
            "Resources:\n  Bucket:\n    Type: AWS::S3::Bucket\n  Other: {}\n"
        );

        let out = render(source, json!({"buckets": {"internal": ""}})).unwrap();
        assert_eq!(out, "Resources:\n  Other: {}\n");
    }

    #[test]
    fn test_else_and_negation() {
        let source = "{% if not vpc %}public{% else %}private{% endif %}";
        assert_eq!(render(source, json!({})).unwrap(), "public");
        assert_eq!(render(source, json!({"vpc": {"id": "v"}})).unwrap(), "private");
    }

    #[test]
    fn test_iteration_with_loop_metadata() {
        let source = "[{% for s in statements %}\"{{ s.Effect }}\"{% if not loop.last %}, {% endif %}{% endfor %}]";
        let out = render(
            source,
            json!({"statements": [{"Effect": "Allow"}, {"Effect": "Deny"}]}),
        )
        .unwrap();
        assert_eq!(out, "[\"Allow\", \"Deny\"]");
    }

    #[test]
    fn test_mapping_iteration_and_element_keys() {
        let source = "{% for name, fn in lambdas %}\n{{ name }}: {{ memory }}/{{ fn.memory }}\n{% endfor %}\n";
        let out = render(
            source,
            json!({"memory": 128, "lambdas": {"api": {"memory": 512}, "worker": {"memory": 256}}}),
        )
        .unwrap();
        assert_eq!(out, "api: 512/512\nworker: 256/256\n");
    }

    #[test]
    fn test_inner_binding_shadows_outer() {
        let source = "{% for stackName in names %}{{ stackName }};{% endfor %}{{ stackName }}";
        let out = render(source, json!({"stackName": "outer", "names": ["a", "b"]})).unwrap();
        assert_eq!(out, "a;b;outer");
    }

    #[test]
    fn test_nested_loops_see_outer_binding() {
        let source = "{% for g in groups %}{% for m in g.members %}{{ g.name }}.{{ m }} {% endfor %}{% endfor %}";
        let out = render(
            source,
            json!({"groups": [{"name": "a", "members": [1, 2]}, {"name": "b", "members": [3]}]}),
        )
        .unwrap();
        assert_eq!(out, "a.1 a.2 b.3 ");
    }

    #[test]
    fn test_empty_iteration_uses_else() {
        let source = "{% for x in items %}{{ x }}{% else %}none{% endfor %}";
        assert_eq!(render(source, json!({"items": []})).unwrap(), "none");
        assert_eq!(render(source, json!({"items": null})).unwrap(), "none");
    }

    #[test]
    fn test_iteration_over_absent_path_fails() {
        let err = render("{% for x in nothing %}{% endfor %}", json!({})).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { path } if path == "nothing"));
    }

    #[test]
    fn test_iteration_over_scalar_fails() {
        let err = render("{% for x in name %}{% endfor %}", json!({"name": "s"})).unwrap_err();
        assert!(matches!(err, Error::TemplateSyntax { .. }));
    }

    #[test]
    fn test_unresolved_inside_skipped_branch_is_not_evaluated() {
        let out = render("{% if off %}{{ missing }}{% endif %}ok", json!({"off": false})).unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_structured_embedding_is_valid_yaml() {
        let source = "Tags: {{ tags }}\nList: {{ subnets }}\n";
        let compiled = expand(
            &TemplateDocument::new("t", source),
            &cfg(json!({"tags": {"team": "ops"}, "subnets": ["a", "b"]})),
        )
        .unwrap();
        let parsed = compiled.validate_syntax().unwrap();
        assert_eq!(parsed["Tags"]["team"], serde_yaml::Value::from("ops"));
        assert_eq!(parsed["List"][1], serde_yaml::Value::from("b"));
    }

    #[test]
    fn test_validate_syntax_rejects_broken_output() {
        let compiled = expand(
            &TemplateDocument::new("t", "a: [unclosed\n"),
            &cfg(json!({})),
        )
        .unwrap();
        assert!(matches!(
            compiled.validate_syntax().unwrap_err(),
            Error::TemplateSyntax { .. }
        ));
    }

    #[test]
    fn test_cloudformation_tags_accepted() {
        let compiled = expand(
            &TemplateDocument::new("t", "Value: !Ref {{ name }}\nArn: !GetAtt Fn.Arn\n"),
            &cfg(json!({"name": "Bucket"})),
        )
        .unwrap();
        assert!(compiled.validate_syntax().is_ok());
    }
}
